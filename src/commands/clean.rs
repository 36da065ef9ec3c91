use tracing::info;

use crate::{CleanArgs, GlobalArgs, config::LoadedConfig};

pub async fn run(global: &GlobalArgs, args: &CleanArgs) -> Result<(), anyhow::Error> {
    let loaded = LoadedConfig::load_from_arg(Some(&global.config)).await?;
    let config = &loaded.config;

    let mut outputs = vec![
        config.styles.output.clone(),
        config.scripts.output.clone(),
        config.email.output.clone(),
    ];
    outputs.dedup();

    for output in outputs {
        // Never remove the project itself
        if loaded.base_path.starts_with(&output) {
            anyhow::bail!(
                "refusing to delete {}, it contains the project",
                output.display()
            );
        }
        if !output.exists() {
            continue;
        }
        if args.dry_run {
            println!("Would delete {}", output.display());
        } else {
            tokio::fs::remove_dir_all(&output).await?;
            info!(path = %output.display(), "deleted");
        }
    }

    Ok(())
}
