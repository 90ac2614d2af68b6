use std::env;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use log::warn;

use crate::command::{Command, Response};

/// Clients that never finish their line get cut off after this long so a
/// stuck peer cannot stall the event loop.
const CLIENT_IO_TIMEOUT: Duration = Duration::from_secs(1);

pub fn socket_path() -> Result<PathBuf> {
    let runtime_dir = env::var("XDG_RUNTIME_DIR").context("XDG_RUNTIME_DIR not set")?;
    Ok(PathBuf::from(runtime_dir).join("intime.sock"))
}

/// Bind the control socket, replacing any stale file from a previous run.
/// The endpoint is world-readable/writable by design: the channel is a
/// local-machine convenience, not a trust boundary.
pub fn setup_listener() -> Result<UnixListener> {
    let path = socket_path()?;

    if path.exists() {
        std::fs::remove_file(&path)
            .with_context(|| format!("removing stale socket {}", path.display()))?;
    }

    let listener =
        UnixListener::bind(&path).with_context(|| format!("binding {}", path.display()))?;
    listener.set_nonblocking(true)?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666))?;

    Ok(listener)
}

pub fn unlink_socket() -> Result<()> {
    let path = socket_path()?;
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    Ok(())
}

/// Serve one accepted client: read a single request line, resolve it with
/// `dispatch`, write a single response, close. Handler errors surface as
/// `ERROR:` responses, never as a server crash.
pub fn serve_client<F>(stream: UnixStream, dispatch: F)
where
    F: FnOnce(Command) -> Response,
{
    if let Err(e) = stream.set_read_timeout(Some(CLIENT_IO_TIMEOUT)) {
        warn!("ipc: could not set client timeout: {e}");
    }
    let _ = stream.set_write_timeout(Some(CLIENT_IO_TIMEOUT));

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    if reader.read_line(&mut line).is_err() || line.trim().is_empty() {
        return;
    }

    let response = match Command::parse(&line) {
        Ok(command) => dispatch(command),
        Err(name) => Response::unknown_command(&name),
    };

    let mut stream = reader.into_inner();
    if let Err(e) = stream.write_all(response.to_string().as_bytes()) {
        warn!("ipc: failed to write response: {e}");
    }
    let _ = stream.flush();
}

/// Send one command to a running overlay and return the raw response line.
pub fn invoke_daemon(request: &str) -> Result<String> {
    let path = socket_path()?;
    let mut stream = UnixStream::connect(&path)
        .with_context(|| format!("is an overlay running? (connect {})", path.display()))?;

    stream.write_all(request.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;

    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    Ok(response.trim_end().to_string())
}
