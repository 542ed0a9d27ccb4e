//! Directory file server on a TCP listener.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::storage::StorageError;
use crate::worker::SharedError;

/// Longest accepted request line.
const MAX_NAME_BYTES: u64 = 4096;

/// One directory served on one listener.
pub struct FileServer {
    addr: SocketAddr,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl FileServer {
    /// Bind `address` and serve files under `dir`.
    pub async fn bind(address: &str, dir: &str) -> Result<Self, StorageError> {
        let dir_error = |source| StorageError::Directory {
            dir: dir.to_string(),
            source,
        };
        let root = tokio::fs::canonicalize(dir).await.map_err(dir_error)?;
        if !tokio::fs::metadata(&root).await.map_err(dir_error)?.is_dir() {
            return Err(dir_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a directory",
            )));
        }

        let bind_error = |source| StorageError::Bind {
            address: address.to_string(),
            source,
        };
        let listener = TcpListener::bind(address).await.map_err(bind_error)?;
        let addr = listener.local_addr().map_err(bind_error)?;

        let token = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, Arc::new(root.clone()), token.clone()));
        tracing::info!(dir = %root.display(), address = %addr, "Serving storage");

        Ok(Self {
            addr,
            token,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, abort transfers in progress and release the socket.
    pub async fn close(self) -> Result<(), SharedError> {
        self.token.cancel();
        self.task.await.map_err(|e| Arc::new(e) as SharedError)?;
        tracing::debug!(address = %self.addr, "Storage listener closed");
        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, root: Arc<PathBuf>, token: CancellationToken) {
    let mut transfers = JoinSet::new();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let root = root.clone();
                    transfers.spawn(async move {
                        if let Err(err) = serve_file(stream, &root).await {
                            tracing::debug!(peer_addr = %peer, error = %err, "Storage request failed");
                        }
                    });
                }
                Err(err) => tracing::warn!(error = %err, "Storage accept failed"),
            },
            Some(_) = transfers.join_next(), if !transfers.is_empty() => {}
        }
    }
    transfers.shutdown().await;
}

async fn serve_file(stream: TcpStream, root: &Path) -> Result<(), StorageError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut line = String::new();
    BufReader::new(read_half.take(MAX_NAME_BYTES))
        .read_line(&mut line)
        .await?;
    let name = line.trim_end_matches(['\r', '\n']);

    match open_confined(root, name).await {
        Ok(mut file) => {
            write_half.write_all(b"OK\n").await?;
            tokio::io::copy(&mut file, &mut write_half).await?;
        }
        Err(err) => {
            write_half.write_all(format!("ERR {err}\n").as_bytes()).await?;
        }
    }
    write_half.shutdown().await?;
    Ok(())
}

/// Map a request name to a path under `root`, refusing parent and absolute
/// components.
pub(crate) fn resolve(root: &Path, name: &str) -> Result<PathBuf, StorageError> {
    let relative = Path::new(name);
    let plain = !name.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !plain {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(root.join(relative))
}

/// Open `name` under `root`, following symlinks only while they stay inside
/// it. `root` must already be canonical.
async fn open_confined(root: &Path, name: &str) -> Result<tokio::fs::File, StorageError> {
    let path = tokio::fs::canonicalize(resolve(root, name)?).await?;
    if !path.starts_with(root) {
        tracing::warn!(name = %name, "Refusing path that resolves outside storage");
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(tokio::fs::File::open(&path).await?)
}

/// Fetch `name` from the storage server at `address`.
pub async fn fetch(address: &str, name: &str) -> Result<Vec<u8>, StorageError> {
    let mut stream = TcpStream::connect(address).await?;
    stream.write_all(format!("{name}\n").as_bytes()).await?;

    let mut reader = BufReader::new(stream);
    let mut status = String::new();
    reader.read_line(&mut status).await?;
    let status = status.trim_end();
    if let Some(reason) = status.strip_prefix("ERR ") {
        return Err(StorageError::Remote(reason.to_string()));
    }
    if status != "OK" {
        return Err(StorageError::Remote(format!("unexpected status line {status:?}")));
    }

    let mut body = Vec::new();
    reader.read_to_end(&mut body).await?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fleet-storage-{label}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_resolve_refuses_escapes() {
        let root = Path::new("/srv/storage");
        assert_eq!(resolve(root, "tools/a.tgz").unwrap(), root.join("tools/a.tgz"));
        assert!(resolve(root, "../etc/passwd").is_err());
        assert!(resolve(root, "tools/../../x").is_err());
        assert!(resolve(root, "/etc/passwd").is_err());
        assert!(resolve(root, "").is_err());
    }

    #[tokio::test]
    async fn test_serves_file_and_refuses_escape() {
        let dir = temp_dir("serve");
        std::fs::write(dir.join("hello.txt"), b"hello storage").unwrap();

        let server = FileServer::bind("127.0.0.1:0", dir.to_str().unwrap()).await.unwrap();
        let addr = server.addr().to_string();

        assert_eq!(fetch(&addr, "hello.txt").await.unwrap(), b"hello storage");
        assert!(matches!(fetch(&addr, "../hello.txt").await, Err(StorageError::Remote(_))));
        assert!(matches!(fetch(&addr, "missing.txt").await, Err(StorageError::Remote(_))));

        server.close().await.unwrap();
        assert!(TcpStream::connect(&addr).await.is_err());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_directory_is_refused() {
        let dir = temp_dir("links");
        let outside = temp_dir("outside");
        std::fs::write(outside.join("secret"), b"outside").unwrap();
        std::fs::write(dir.join("inside"), b"inside").unwrap();
        std::os::unix::fs::symlink(outside.join("secret"), dir.join("escape")).unwrap();
        std::os::unix::fs::symlink(dir.join("inside"), dir.join("alias")).unwrap();

        let root = tokio::fs::canonicalize(&dir).await.unwrap();
        assert!(matches!(
            open_confined(&root, "escape").await,
            Err(StorageError::InvalidName(_))
        ));
        assert!(open_confined(&root, "alias").await.is_ok());

        let server = FileServer::bind("127.0.0.1:0", dir.to_str().unwrap()).await.unwrap();
        let addr = server.addr().to_string();
        assert!(matches!(fetch(&addr, "escape").await, Err(StorageError::Remote(_))));
        assert_eq!(fetch(&addr, "alias").await.unwrap(), b"inside");

        server.close().await.unwrap();
        std::fs::remove_dir_all(dir).unwrap();
        std::fs::remove_dir_all(outside).unwrap();
    }

    #[tokio::test]
    async fn test_missing_directory_is_rejected() {
        let missing = std::env::temp_dir().join(format!("fleet-missing-{}", uuid::Uuid::new_v4()));
        let err = FileServer::bind("127.0.0.1:0", missing.to_str().unwrap()).await.err().unwrap();
        assert!(matches!(err, StorageError::Directory { .. }));
    }
}
