use anyhow::Context;
use std::env;
use std::path::PathBuf;

fn home_dir() -> anyhow::Result<PathBuf> {
    // On Unix, HOME is standard. (Windows support can be expanded later.)
    let home = env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home))
}

fn appgen_home() -> Option<PathBuf> {
    env::var_os("APPGEN_HOME").map(PathBuf::from)
}

/// Where `config.toml` is looked up. Resolving it never touches the filesystem.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    if let Some(base) = appgen_home() {
        return Ok(base.join("config"));
    }

    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").map(PathBuf::from) {
        return Ok(xdg.join("appgen"));
    }

    Ok(home_dir()?.join(".config").join("appgen"))
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_lookup_creates_nothing() {
        let scratch = tempfile::tempdir().unwrap();
        let home = scratch.path().join("appgen-home");
        env::set_var("APPGEN_HOME", &home);

        let path = config_path().unwrap();
        env::remove_var("APPGEN_HOME");

        assert_eq!(path, home.join("config").join("config.toml"));
        assert!(!home.exists());
        assert!(crate::config::Config::load_optional(&path).unwrap().is_none());
        assert!(!home.exists());
    }
}
