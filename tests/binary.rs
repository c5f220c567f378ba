use std::net::TcpStream;
use std::process::{Command, Output};
use std::thread;
use std::time::{Duration, Instant};

use common::{free_port, Certificates, PlayingField};
use friedman_agent::configuration::{
    CERTIFICATE_SETTINGS_ENV_VAR, FRIEDMAN_BIND_IP_ENV_VAR, FRIEDMAN_NAME_ENV_VAR,
    FRIEDMAN_PORT_ENV_VAR, PLAYING_FIELD_HOST_ENV_VAR, PLAYING_FIELD_PORT_ENV_VAR,
};
use tonic::Code;

mod common;

fn friedman() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_friedman"));
    command
        .env_remove(CERTIFICATE_SETTINGS_ENV_VAR)
        .env_remove(FRIEDMAN_PORT_ENV_VAR)
        .env_remove(PLAYING_FIELD_PORT_ENV_VAR)
        .env_remove(PLAYING_FIELD_HOST_ENV_VAR)
        .env_remove(FRIEDMAN_NAME_ENV_VAR);
    command
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn missing_settings_exit_with_failure() {
    let output = friedman().output().unwrap();
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("CERTIFICATE_SETTINGS environment variable not set"),
        "{}",
        stderr(&output)
    );
}

#[test]
fn missing_certificates_exit_with_failure() {
    let output = friedman()
        .env(CERTIFICATE_SETTINGS_ENV_VAR, r#"{"path":"/nonexistent/service"}"#)
        .env(FRIEDMAN_PORT_ENV_VAR, free_port().to_string())
        .env(PLAYING_FIELD_PORT_ENV_VAR, free_port().to_string())
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("/nonexistent/service.crt"),
        "{}",
        stderr(&output)
    );
}

#[test]
fn rejected_registration_exits_with_failure() {
    let certificates = Certificates::generate();
    let field =
        PlayingField::rejecting(&certificates, Code::FailedPrecondition, "tournament closed");

    let output = friedman()
        .env(CERTIFICATE_SETTINGS_ENV_VAR, certificates.settings())
        .env(FRIEDMAN_PORT_ENV_VAR, free_port().to_string())
        .env(PLAYING_FIELD_PORT_ENV_VAR, field.port().to_string())
        .env(FRIEDMAN_BIND_IP_ENV_VAR, "127.0.0.1")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("tournament closed"), "{}", stderr(&output));
    assert_eq!(field.subscribed().unwrap().name, "Friedman");
}

#[cfg(unix)]
#[test]
fn terminates_cleanly_on_sigterm() {
    let certificates = Certificates::generate();
    let field = PlayingField::accepting(&certificates);
    let port = free_port();

    let mut child = friedman()
        .env(CERTIFICATE_SETTINGS_ENV_VAR, certificates.settings())
        .env(FRIEDMAN_PORT_ENV_VAR, port.to_string())
        .env(PLAYING_FIELD_PORT_ENV_VAR, field.port().to_string())
        .spawn()
        .unwrap();

    let info = field.subscribed().expect("the agent never registered");
    assert_eq!(info.address, format!("https://localhost:{port}"));
    assert!(TcpStream::connect(("127.0.0.1", port)).is_ok());

    let kill = Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(kill.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("the agent ignored SIGTERM");
        }
        thread::sleep(Duration::from_millis(50));
    };
    assert!(status.success(), "{status}");
    assert!(TcpStream::connect(("127.0.0.1", port)).is_err());
}
