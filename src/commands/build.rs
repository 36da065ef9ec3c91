use crate::{BuildArgs, GlobalArgs, build::BuildMode, commands::Session, tasks::BUILD};

pub async fn run(global: &GlobalArgs, args: &BuildArgs) -> Result<(), anyhow::Error> {
    let mode = BuildMode::resolve(args.production);
    let session = Session::open(&global.config, mode).await?;
    session.run(BUILD).await
}
