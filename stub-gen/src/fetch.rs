use std::path::{Path, PathBuf};

use crate::error::{Error, FetchError, SlotId};

/// Where the stub descriptors of one run come from.
///
/// Constructed once per run from the command line and dropped when the run completes.
#[derive(Debug)]
pub enum DescriptorSource {
    /// Published descriptors, at `{base_url}/v{version}[/{dir}]/{descriptor}`.
    Remote {
        client: reqwest::Client,
        base_url: String,
        version: String,
        dir: Option<String>,
    },
    /// A local directory holding the descriptors, for testing unreleased stubs.
    Local { dir: PathBuf },
}

impl DescriptorSource {
    pub fn remote(base_url: &str, version: &str, dir: Option<&str>) -> Self {
        Self::remote_with_client(reqwest::Client::new(), base_url, version, dir)
    }

    pub fn remote_with_client(
        client: reqwest::Client,
        base_url: &str,
        version: &str,
        dir: Option<&str>,
    ) -> Self {
        Self::Remote {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            version: version.to_owned(),
            dir: dir
                .map(|dir| dir.trim_matches('/').to_owned())
                .filter(|dir| !dir.is_empty()),
        }
    }

    pub fn local(dir: &Path) -> Self {
        Self::Local {
            dir: dir.to_owned(),
        }
    }

    /// The URL or path `descriptor` is read from.
    pub fn location(&self, descriptor: &str) -> String {
        match self {
            Self::Remote {
                base_url,
                version,
                dir,
                ..
            } => match dir {
                Some(dir) => format!("{base_url}/v{version}/{dir}/{descriptor}"),
                None => format!("{base_url}/v{version}/{descriptor}"),
            },
            Self::Local { dir } => dir.join(descriptor).display().to_string(),
        }
    }

    /// Reads the raw JSON text of `descriptor`, which belongs to `slot`.
    pub async fn fetch(&self, slot: &SlotId, descriptor: &str) -> Result<Vec<u8>, Error> {
        match self {
            Self::Remote { client, .. } => {
                let url = self.location(descriptor);
                tracing::debug!("Downloading {url}");

                fetch_url(client, &url).await.map_err(|source| Error::Fetch {
                    slot: slot.clone(),
                    url,
                    source,
                })
            }
            Self::Local { dir } => {
                let path = dir.join(descriptor);
                tracing::debug!("Reading {}", path.display());

                match tokio::fs::read(&path).await {
                    Ok(bytes) => Ok(bytes),
                    Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                        Err(Error::NotFound {
                            slot: slot.clone(),
                            path,
                        })
                    }
                    Err(source) => Err(Error::Read {
                        slot: slot.clone(),
                        path,
                        source,
                    }),
                }
            }
        }
    }
}

async fn fetch_url(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    Ok(response.bytes().await?.to_vec())
}
