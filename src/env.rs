use std::path::Path;

use tracing::{info, warn};

pub fn env_files(is_production: bool) -> Vec<&'static str> {
    if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    }
}

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    for env_file in env_files(is_production) {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_env_files_follow_profile() {
        assert!(env_files(true).contains(&"config/prod.env"));
        assert!(env_files(false).contains(&"config/dev.env"));
        assert_eq!(env_files(false).last(), Some(&".secrets.env"));
    }

    #[test]
    #[serial]
    fn test_missing_files_are_skipped() {
        temp_env::with_var("ROCKET_PROFILE", Some("production"), || {
            assert!(load_env_file("config/does-not-exist.env").is_ok());
        });
    }
}
