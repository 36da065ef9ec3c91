use crate::{GlobalArgs, RunArgs, build::BuildMode, commands::Session};

pub async fn run(global: &GlobalArgs, args: &RunArgs) -> Result<(), anyhow::Error> {
    let mode = BuildMode::resolve(args.production);
    let session = Session::open(&global.config, mode).await?;
    session.run(&args.task).await
}
