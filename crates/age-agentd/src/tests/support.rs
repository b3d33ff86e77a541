//! Shared harness running a real agent server against scripted plugins.

use std::fs::{self, Permissions};
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use age_agent_config::{Config, SocketPath};
use age_agent_protocol::{read_frame, write_frame};

use crate::{
    AgentConnectionHandler, BridgeTimeouts, ChannelShutdownSignal, LaunchError, PluginResolver,
    ProcessBridge, run_server_with,
};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake deadline used by harness servers.
pub(crate) const TEST_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(300);

pub(crate) struct AgentHarness {
    dir: TempDir,
    trigger: Option<Sender<()>>,
    server: Option<JoinHandle<Result<(), LaunchError>>>,
}

impl AgentHarness {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().expect("harness dir");
        fs::create_dir(dir.path().join("bin")).expect("plugin dir");
        Self {
            dir,
            trigger: None,
            server: None,
        }
    }

    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn socket_path(&self) -> PathBuf {
        self.dir.path().join("agent.sock")
    }

    pub(crate) fn lock_path(&self) -> PathBuf {
        self.dir.path().join("agent.sock.lock")
    }

    fn plugin_dir(&self) -> PathBuf {
        self.dir.path().join("bin")
    }

    /// Installs `age-plugin-<name>` as a shell script.
    pub(crate) fn install_plugin(&self, name: &str, body: &str, mode: u32) -> PathBuf {
        let path = self.plugin_dir().join(format!("age-plugin-{name}"));
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write plugin");
        fs::set_permissions(&path, Permissions::from_mode(mode)).expect("chmod plugin");
        path
    }

    pub(crate) fn start(&mut self) {
        let socket = SocketPath::try_from(self.socket_path()).expect("utf8 socket path");
        let config = Config::new(socket);
        let handler = AgentConnectionHandler::new(PluginResolver::new(self.plugin_dir()))
            .with_handshake_timeout(TEST_HANDSHAKE_TIMEOUT)
            .with_bridge(ProcessBridge::new(BridgeTimeouts {
                grace: Duration::from_millis(200),
                terminate: Duration::from_millis(200),
                drain: Duration::from_millis(500),
            }));
        let (trigger, signal) = ChannelShutdownSignal::new();
        self.trigger = Some(trigger);
        self.server = Some(thread::spawn(move || {
            run_server_with(&config, handler, &signal)
        }));
        assert!(
            wait_until(STARTUP_TIMEOUT, || UnixStream::connect(self.socket_path()).is_ok()),
            "server did not start listening"
        );
    }

    pub(crate) fn stop(&mut self) -> Option<Result<(), LaunchError>> {
        if let Some(trigger) = self.trigger.take() {
            drop(trigger.send(()));
        }
        self.server
            .take()
            .map(|server| server.join().expect("server thread"))
    }

    pub(crate) fn connect(&self) -> UnixStream {
        let stream = UnixStream::connect(self.socket_path()).expect("connect client");
        stream
            .set_read_timeout(Some(CLIENT_TIMEOUT))
            .expect("client read timeout");
        stream
    }
}

impl Drop for AgentHarness {
    fn drop(&mut self) {
        drop(self.stop());
    }
}

/// Connects and sends `name`, returning the stream and the response line.
pub(crate) fn request_plugin(harness: &AgentHarness, name: &str) -> (UnixStream, String) {
    let mut stream = harness.connect();
    write_frame(&mut stream, name).expect("send plugin name");
    let response = read_frame(&mut stream, CLIENT_TIMEOUT).expect("read response");
    stream
        .set_read_timeout(Some(CLIENT_TIMEOUT))
        .expect("client read timeout");
    (stream, response)
}

/// Sends `input`, half-closes, and collects everything the server returns.
pub(crate) fn exchange(stream: &mut UnixStream, input: &[u8]) -> Vec<u8> {
    stream.write_all(input).expect("send input");
    stream
        .shutdown(std::net::Shutdown::Write)
        .expect("half-close");
    read_to_end(stream)
}

pub(crate) fn read_to_end(stream: &mut UnixStream) -> Vec<u8> {
    let mut output = Vec::new();
    stream.read_to_end(&mut output).expect("read output");
    output
}

pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}
