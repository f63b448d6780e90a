use std::path::Path;

use {
    airbot_sessions::{FileSessionStore, SessionStore},
    anyhow::Result,
    tracing::info,
};

use crate::bot::{self, Overrides};

pub async fn logout(config_path: Option<&Path>, overrides: Overrides) -> Result<()> {
    let config = bot::load(config_path, overrides)?;
    delete_session(&config.bot.session_dir).await?;
    eprintln!(
        "Session at {} removed; the next run pairs a new device.",
        config.bot.session_dir.display()
    );
    Ok(())
}

async fn delete_session(dir: &Path) -> Result<()> {
    FileSessionStore::new(dir).delete().await?;
    info!(path = %dir.display(), "session deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deletes_session_dir_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("session");
        std::fs::create_dir_all(&session).unwrap();
        std::fs::write(session.join("creds.json"), "{}").unwrap();

        delete_session(&session).await.unwrap();
        assert!(!session.exists());

        delete_session(&session).await.unwrap();
    }
}
