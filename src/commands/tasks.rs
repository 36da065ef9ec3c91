use crate::{GlobalArgs, build::BuildMode, commands::Session, tasks::TaskKind};

pub async fn run(global: &GlobalArgs) -> Result<(), anyhow::Error> {
    let session = Session::open(&global.config, BuildMode::Development).await?;

    for task in session.registry.tasks() {
        let mut line = task.name.clone();
        if !task.dependencies.is_empty() {
            line.push_str(&format!("  <- {}", task.dependencies.join(", ")));
        }
        if task.kind == TaskKind::Sequence {
            line.push_str(&format!("  [{}]", task.steps.join(" -> ")));
        }
        println!("{line}");
    }

    Ok(())
}
