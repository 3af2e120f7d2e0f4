use std::path::Path;

use anyhow::{bail, Context};
use nodekit::http::ReqwestFetch;
use nodekit::node::participation::{self, ParticipationKey};

pub(crate) async fn cmd_hash(
    key: Option<&Path>,
    offline: Option<&str>,
    network: &str,
    link: bool,
) -> anyhow::Result<()> {
    match (key, offline) {
        (Some(path), _) => {
            let raw = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let key: ParticipationKey =
                serde_json::from_slice(&raw).context("Not a participation key document")?;
            println!("{}", participation::integrity_hash(&key)?);

            if link {
                let http = ReqwestFetch::new()?;
                let short = participation::create_online_short_link(&http, &key, network).await?;
                println!("{}", short.id);
            }
        }
        (None, Some(address)) => {
            println!("{}", participation::offline_hash(address, network)?);

            if link {
                let http = ReqwestFetch::new()?;
                let short =
                    participation::create_offline_short_link(&http, address, network).await?;
                println!("{}", short.id);
            }
        }
        (None, None) => bail!("pass --key <file> or --offline <address>"),
    }
    Ok(())
}
