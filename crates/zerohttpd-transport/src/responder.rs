use crate::context::{RequestContext, MAX_WRITE_BUFFERS};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use zerohttpd_codec::{canned_body, FileHeaders};
use zerohttpd_core::{Canned, Failure, ServerConfig};
use zerohttpd_dsa::{BufferLedger, IoBuffer};

/// A file response ready for submission, plus a short-read report if the
/// file shrank between `stat` and `read`.
#[derive(Debug)]
pub struct Served {
    pub context: RequestContext,
    pub short_read: Option<Failure>,
}

/// Maps request paths onto files under the public root and builds the
/// Write contexts that carry them.
pub struct StaticFileResponder {
    root: PathBuf,
    banner: String,
    confine_to_root: bool,
    ledger: Arc<BufferLedger>,
}

impl StaticFileResponder {
    pub fn new(config: &ServerConfig, ledger: Arc<BufferLedger>) -> Self {
        Self {
            root: config.public_root.clone(),
            banner: config.banner(),
            confine_to_root: config.confine_to_root,
            ledger,
        }
    }

    /// Joins `path` under the public root. A trailing `/` asks for the
    /// directory's `index.html`.
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf, Failure> {
        let path = path.as_ref();
        if self.confine_to_root && path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(Failure::TraversalRejected(path.display().to_string()));
        }

        let raw = path.as_os_str().as_bytes();
        let start = raw.iter().position(|b| *b != b'/').unwrap_or(raw.len());
        let mut resolved = self.root.join(OsStr::from_bytes(&raw[start..]));
        if raw.ends_with(b"/") {
            resolved.push("index.html");
        }
        Ok(resolved)
    }

    /// Builds the six-buffer response for the file `path` names.
    pub fn respond<P: AsRef<Path>>(&self, path: P, socket: RawFd) -> Result<Served, Failure> {
        let resolved = self.resolve(path)?;
        let metadata = match fs::metadata(&resolved) {
            Ok(metadata) => metadata,
            Err(_) => return Err(Failure::FileMissing(resolved)),
        };
        if !metadata.is_file() {
            return Err(Failure::NotRegularFile(resolved));
        }

        let size = metadata.len();
        let (body, short_read) = self.load(&resolved, size)?;

        let headers = FileHeaders::new(&self.banner, &resolved, size);
        let mut buffers = Vec::with_capacity(MAX_WRITE_BUFFERS);
        buffers.extend(headers.parts().iter().map(|part| self.ledger.copy_from(part)));
        buffers.push(body);

        tracing::info!("200 {} {} bytes", resolved.display(), size);
        Ok(Served {
            context: RequestContext::Write { socket, buffers },
            short_read,
        })
    }

    /// One read into one buffer sized from `stat`. A short read is reported,
    /// not retried; the unread tail stays zero-filled.
    fn load(&self, path: &Path, size: u64) -> Result<(IoBuffer, Option<Failure>), Failure> {
        let unreadable = || Failure::FileUnreadable(path.to_path_buf());
        let len = usize::try_from(size).map_err(|_| unreadable())?;
        let mut file = File::open(path).map_err(|_| unreadable())?;

        let mut body = self.ledger.zeroed(len);
        let got = file.read(&mut body).map_err(|_| unreadable())?;

        let short_read = (got < len).then(|| Failure::ShortRead {
            path: path.to_path_buf(),
            expected: size,
            got,
        });
        Ok((body, short_read))
    }

    /// Single-buffer response holding one of the fixed bodies.
    pub fn respond_canned(&self, canned: Canned, socket: RawFd) -> RequestContext {
        self.respond_string(canned_body(canned), socket)
    }

    pub fn respond_string(&self, content: &[u8], socket: RawFd) -> RequestContext {
        RequestContext::Write {
            socket,
            buffers: vec![self.ledger.copy_from(content)],
        }
    }
}
