use tracing::info;

use crate::{
    InitArgs,
    config::{DEFAULT_CONFIG_FILE, ProjectConfig},
};

pub async fn run(args: &InitArgs) -> Result<(), anyhow::Error> {
    let path = if args.path.is_relative() {
        std::env::current_dir()?.join(&args.path)
    } else {
        args.path.clone()
    };

    if !path.exists() {
        if args.create {
            tokio::fs::create_dir_all(&path).await?;
            info!(path = %path.display(), "created directory");
        } else {
            return Err(anyhow::anyhow!(
                "Directory does not exist: {path}",
                path = path.display()
            ));
        }
    }

    let config_file = path.join(DEFAULT_CONFIG_FILE);
    if config_file.exists() {
        anyhow::bail!("{} already exists", config_file.display());
    }

    let config_text = serde_yaml::to_string(&ProjectConfig::default())?;
    tokio::fs::write(&config_file, config_text).await?;

    info!(config = %config_file.display(), "created config file");

    Ok(())
}
