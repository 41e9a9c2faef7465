//! Child-process transport for the core server.
//!
//! [`IoTransport`] spawns `deltachat-rpc-server`, frames JSON-RPC 2.0 as one
//! object per line over the child's stdio and correlates concurrent calls by
//! request id. Events are not pushed by the server; they are fetched through
//! the long-polling `get_next_event` call like any other request.

use std::{
    collections::HashMap,
    path::PathBuf,
    process::Stdio,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex as StdMutex,
    },
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStderr, ChildStdin, ChildStdout, Command},
    sync::{oneshot, Mutex},
};
use tokio_util::sync::CancellationToken;

use chatmail_core::{Error, Result};

/// Environment variable telling the server where to keep account state.
pub const ACCOUNTS_PATH_ENV: &str = "DC_ACCOUNTS_PATH";

/// Server binary resolved through `PATH` when no explicit path is set.
pub const DEFAULT_SERVER_BIN: &str = "deltachat-rpc-server";

/// Where the child's stderr goes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StderrMode {
    /// Share the host process stderr (the default, like a shell pipeline).
    #[default]
    Inherit,
    /// Discard everything the server logs.
    Null,
    /// Forward each stderr line into `tracing` at warn level.
    Log,
}

/// How to spawn the core server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub cmd: PathBuf,
    /// Passed to the child as `DC_ACCOUNTS_PATH` when set.
    pub accounts_dir: Option<PathBuf>,
    pub stderr: StderrMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cmd: PathBuf::from(DEFAULT_SERVER_BIN),
            accounts_dir: None,
            stderr: StderrMode::Inherit,
        }
    }
}

/// Seam between the typed facade and the process plumbing.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// One JSON-RPC round trip. `params` must be the positional parameter
    /// array. Returns the `result` member of the response.
    ///
    /// Cancellation is by drop: abandoning the returned future (e.g. through
    /// `tokio::select!` or `tokio::time::timeout`) unblocks the caller but
    /// does not cancel the work already queued in the server.
    async fn request(&self, method: &str, params: Value) -> Result<Value>;
}

/// State of one running child process. Shared between the caller-facing
/// handle, the reader task and in-flight calls.
struct Conn {
    cancel: CancellationToken,
    next_id: AtomicU64,
    pending: StdMutex<HashMap<u64, oneshot::Sender<Result<Value>>>>,
    /// Exclusive-write resource; the lock is held only across one line write.
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
}

/// Transport over a `deltachat-rpc-server` child process.
///
/// Safe to share: any number of tasks may issue calls concurrently. The
/// transport owns at most one child between [`open`](Self::open) and
/// [`close`](Self::close) and never restarts it on its own.
pub struct IoTransport {
    cfg: ServerConfig,
    conn: StdMutex<Option<Arc<Conn>>>,
}

impl IoTransport {
    pub fn new(cfg: ServerConfig) -> Self {
        Self {
            cfg,
            conn: StdMutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.cfg
    }

    /// Spawn the server child and start the response reader.
    ///
    /// Fails with [`Error::AlreadyStarted`] if a child is already running and
    /// with an I/O error if the binary cannot be spawned. Must be called from
    /// within a tokio runtime.
    pub fn open(&self) -> Result<()> {
        let mut slot = self.conn.lock().unwrap();
        if let Some(conn) = slot.as_ref() {
            if !conn.cancel.is_cancelled() {
                return Err(Error::AlreadyStarted);
            }
        }

        let mut command = Command::new(&self.cfg.cmd);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(match self.cfg.stderr {
                StderrMode::Inherit => Stdio::inherit(),
                StderrMode::Null => Stdio::null(),
                StderrMode::Log => Stdio::piped(),
            })
            // Backstop: a dropped transport must not leak the server process.
            .kill_on_drop(true);
        if let Some(dir) = &self.cfg.accounts_dir {
            command.env(ACCOUNTS_PATH_ENV, dir);
        }

        let mut child = command.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("server stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("server stdout was not captured".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        let conn = Arc::new(Conn {
            cancel: CancellationToken::new(),
            next_id: AtomicU64::new(0),
            pending: StdMutex::new(HashMap::new()),
            stdin: Mutex::new(Some(stdin)),
            child: Mutex::new(Some(child)),
        });
        tokio::spawn(read_loop(conn.clone(), stdout));

        *slot = Some(conn);
        Ok(())
    }

    /// Shut the link down: close the child's stdin (its signal to exit),
    /// cancel every in-flight call and reap the process.
    ///
    /// Idempotent; closing a transport that was never opened is a no-op.
    pub async fn close(&self) {
        let conn = { self.conn.lock().unwrap().take() };
        let Some(conn) = conn else {
            return;
        };

        conn.cancel.cancel();
        conn.stdin.lock().await.take();
        let child = conn.child.lock().await.take();
        if let Some(mut child) = child {
            // The server exits once stdin is gone; kill covers the case
            // where it does not. `try_wait` reaps an already-exited child.
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    if let Err(err) = child.kill().await {
                        tracing::warn!("failed to stop server process: {err}");
                    }
                }
            }
        }
    }

    fn live_conn(&self) -> Result<Arc<Conn>> {
        let conn = self
            .conn
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::NotStarted)?;
        if conn.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(conn)
    }
}

#[async_trait]
impl RpcTransport for IoTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let conn = self.live_conn()?;

        let params = if params.is_null() { json!([]) } else { params };
        let id = conn.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut line = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))?;
        line.push(b'\n');

        let (tx, rx) = oneshot::channel();
        conn.pending.lock().unwrap().insert(id, tx);

        {
            let mut stdin = conn.stdin.lock().await;
            let Some(stdin) = stdin.as_mut() else {
                conn.pending.lock().unwrap().remove(&id);
                return Err(Error::Cancelled);
            };
            if let Err(err) = stdin.write_all(&line).await {
                conn.pending.lock().unwrap().remove(&id);
                return Err(Error::Io(err));
            }
        }

        tokio::select! {
            _ = conn.cancel.cancelled() => {
                conn.pending.lock().unwrap().remove(&id);
                Err(Error::Cancelled)
            }
            res = rx => match res {
                Ok(res) => res,
                Err(_) => Err(Error::Transport("connection to server closed".to_string())),
            },
        }
    }
}

/// Read responses off the child's stdout and complete the matching waiters.
/// Any stream failure tears the whole connection down.
async fn read_loop(conn: Arc<Conn>, stdout: ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = tokio::select! {
            _ = conn.cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(&line) {
                    Ok(frame) => route_response(&conn, frame),
                    Err(err) => {
                        tracing::error!("unparseable frame from server: {err}");
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::error!("reading from server failed: {err}");
                break;
            }
        }
    }

    conn.cancel.cancel();
    let waiters: Vec<_> = {
        let mut pending = conn.pending.lock().unwrap();
        pending.drain().map(|(_, tx)| tx).collect()
    };
    for tx in waiters {
        let _ = tx.send(Err(Error::Transport(
            "connection to server closed".to_string(),
        )));
    }
}

fn route_response(conn: &Conn, frame: Value) {
    let Some(id) = frame.get("id").and_then(Value::as_u64) else {
        // The server does not push notifications; events arrive as
        // `get_next_event` responses.
        tracing::debug!("dropping frame without id: {frame}");
        return;
    };
    let Some(tx) = conn.pending.lock().unwrap().remove(&id) else {
        tracing::debug!("dropping response for unknown call {id}");
        return;
    };

    let res = if let Some(err) = frame.get("error") {
        Err(Error::Rpc {
            code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        })
    } else {
        Ok(frame.get("result").cloned().unwrap_or(Value::Null))
    };
    let _ = tx.send(res);
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::warn!(target: "chatmail_rpc::server", "{line}");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// Stand-in for the server: answers `ping` with "pong", `double` with the
    /// numeric parameter, `fail` with a JSON-RPC error and leaves `hang`
    /// unanswered. Exits when stdin closes, like the real server.
    const FAKE_SERVER: &str = r#"#!/bin/sh
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"fail"'*)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32602,"message":"bad params"}}\n' "$id"
      ;;
    *'"method":"hang"'*)
      ;;
    *'"method":"double"'*)
      n=$(printf '%s' "$line" | sed -n 's/.*"params":\[\([0-9]*\)\].*/\1/p')
      printf '{"jsonrpc":"2.0","id":%s,"result":%s}\n' "$id" "$((n * 2))"
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"result":"pong"}\n' "$id"
      ;;
  esac
done
"#;

    fn fake_server_transport(dir: &tempfile::TempDir) -> IoTransport {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-server.sh");
        std::fs::write(&path, FAKE_SERVER).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();

        IoTransport::new(ServerConfig {
            cmd: path,
            accounts_dir: None,
            stderr: StderrMode::Null,
        })
    }

    #[tokio::test]
    async fn round_trips_a_call() {
        let dir = tempfile::tempdir().unwrap();
        let transport = fake_server_transport(&dir);
        transport.open().unwrap();

        let res = transport.request("ping", json!([])).await.unwrap();
        assert_eq!(res, json!("pong"));

        transport.close().await;
    }

    #[tokio::test]
    async fn correlates_concurrent_calls() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(fake_server_transport(&dir));
        transport.open().unwrap();

        let mut tasks = Vec::new();
        for n in 1u64..=16 {
            let transport = transport.clone();
            tasks.push(tokio::spawn(async move {
                let res = transport.request("double", json!([n])).await.unwrap();
                assert_eq!(res, json!(n * 2));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        transport.close().await;
    }

    #[tokio::test]
    async fn surfaces_server_errors() {
        let dir = tempfile::tempdir().unwrap();
        let transport = fake_server_transport(&dir);
        transport.open().unwrap();

        let err = transport.request("fail", json!([])).await.unwrap_err();
        match err {
            Error::Rpc { code, message } => {
                assert_eq!(code, -32602);
                assert_eq!(message, "bad params");
            }
            other => panic!("expected rpc error, got {other:?}"),
        }

        transport.close().await;
    }

    #[tokio::test]
    async fn open_twice_reports_already_started() {
        let dir = tempfile::tempdir().unwrap();
        let transport = fake_server_transport(&dir);
        transport.open().unwrap();

        assert!(matches!(transport.open(), Err(Error::AlreadyStarted)));

        transport.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let transport = fake_server_transport(&dir);

        // Never opened: nothing to do.
        transport.close().await;

        transport.open().unwrap();
        transport.close().await;
        transport.close().await;

        // A fresh open after close starts a new child.
        transport.open().unwrap();
        let res = transport.request("ping", json!([])).await.unwrap();
        assert_eq!(res, json!("pong"));
        transport.close().await;
    }

    #[tokio::test]
    async fn calls_after_close_fail() {
        let dir = tempfile::tempdir().unwrap();
        let transport = fake_server_transport(&dir);
        transport.open().unwrap();
        transport.close().await;

        let err = transport.request("ping", json!([])).await.unwrap_err();
        assert!(matches!(err, Error::NotStarted | Error::Cancelled));
    }

    #[tokio::test]
    async fn close_cancels_in_flight_calls() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(fake_server_transport(&dir));
        transport.open().unwrap();

        let waiter = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.request("hang", json!([])).await })
        };
        // Let the request reach the child before tearing the link down.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        transport.close().await;

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled | Error::Transport(_)));
    }

    #[tokio::test]
    async fn missing_binary_fails_open() {
        let transport = IoTransport::new(ServerConfig {
            cmd: PathBuf::from("/nonexistent/definitely-not-a-server"),
            accounts_dir: None,
            stderr: StderrMode::Null,
        });
        assert!(matches!(transport.open(), Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn child_exit_fails_pending_calls() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(fake_server_transport(&dir));
        transport.open().unwrap();

        let waiter = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.request("hang", json!([])).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        // Closing stdin makes the script exit; the reader must fail the call.
        {
            let conn = transport.conn.lock().unwrap().clone().unwrap();
            conn.stdin.lock().await.take();
        }

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Transport(_) | Error::Cancelled));

        transport.close().await;
    }
}
