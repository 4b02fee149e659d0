use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;
use std::thread;
use tempfile::tempdir;
use workbot::acl::{AclStore, Membership, PrincipalRecord};
use workbot::bot::{bootstrap, BotError};
use workbot::config::{
    ENV_ADMIN_ID, ENV_AUTHORIZED_IDS, ENV_BOT_TOKEN, ENV_DOCKER_HOST, ENV_RESET_ACL,
    ENV_STATE_ROOT, ENV_TELEGRAM_API_BASE, ENV_WORKLOAD_LABEL,
};
use workbot::shared::logging::event_log_path;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_workbot_env() {
    for key in [
        ENV_BOT_TOKEN,
        ENV_ADMIN_ID,
        ENV_AUTHORIZED_IDS,
        ENV_RESET_ACL,
        ENV_STATE_ROOT,
        ENV_DOCKER_HOST,
        ENV_WORKLOAD_LABEL,
        ENV_TELEGRAM_API_BASE,
    ] {
        std::env::remove_var(key);
    }
}

/// Serves `expected_requests` Bot API calls, dispatching on the method path.
fn start_mock_bot_api<F>(expected_requests: usize, responder: F) -> (String, thread::JoinHandle<()>)
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");

    let handle = thread::spawn(move || {
        for _ in 0..expected_requests {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

            let mut request_line = String::new();
            reader
                .read_line(&mut request_line)
                .expect("read request line");
            let path = request_line
                .split_whitespace()
                .nth(1)
                .unwrap_or("/")
                .to_string();

            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header");
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((key, value)) = line.split_once(':') {
                    if key.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
            }
            let mut body = vec![0_u8; content_length];
            if content_length > 0 {
                reader.read_exact(&mut body).expect("read body");
            }

            let response_body = responder(&path);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response_body.len(),
                response_body
            );
            stream
                .write_all(response.as_bytes())
                .expect("write response");
        }
    });

    (format!("http://{addr}"), handle)
}

fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

fn get_me_ok(path: &str) -> String {
    assert!(path.ends_with("/getMe"), "unexpected call to {path}");
    r#"{"ok":true,"result":{"id":1,"first_name":"workbot"}}"#.to_string()
}

#[test]
fn bootstrap_fails_fast_without_a_bot_token() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_workbot_env();
    let err = bootstrap().expect_err("token required");
    assert!(matches!(err, BotError::Config(_)));
}

#[test]
fn bootstrap_seeds_the_acl_and_tolerates_an_unreachable_manager() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_workbot_env();
    let dir = tempdir().expect("tempdir");
    let (api_base, server) = start_mock_bot_api(1, get_me_ok);

    std::env::set_var(ENV_BOT_TOKEN, "123:abc");
    std::env::set_var(ENV_ADMIN_ID, "42");
    std::env::set_var(ENV_AUTHORIZED_IDS, "7,8");
    std::env::set_var(ENV_STATE_ROOT, dir.path());
    std::env::set_var(ENV_TELEGRAM_API_BASE, &api_base);
    std::env::set_var(ENV_DOCKER_HOST, closed_port_url());

    let result = bootstrap();
    clear_workbot_env();
    server.join().expect("join mock server");
    result.expect("bootstrap succeeds");

    let acl = AclStore::open(&dir.path().join("acl/principals.db")).expect("open acl");
    assert_eq!(acl.membership(7).expect("membership"), Membership::Authorized);
    assert_eq!(acl.membership(8).expect("membership"), Membership::Authorized);

    let log = read_log(dir.path());
    assert!(log.contains("seeded 2 preauthorized principals"));
    assert!(log.contains("initial registry refresh failed"));
}

#[test]
fn reset_flag_reinitializes_the_acl_store() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_workbot_env();
    let dir = tempdir().expect("tempdir");

    let acl = AclStore::open(&dir.path().join("acl/principals.db")).expect("open acl");
    acl.ensure_schema().expect("schema");
    acl.persist(
        &PrincipalRecord {
            principal_id: 9,
            display_name: "Mallory".to_string(),
        },
        true,
    )
    .expect("persist");

    let (api_base, server) = start_mock_bot_api(1, get_me_ok);
    std::env::set_var(ENV_BOT_TOKEN, "123:abc");
    std::env::set_var(ENV_RESET_ACL, "1");
    std::env::set_var(ENV_STATE_ROOT, dir.path());
    std::env::set_var(ENV_TELEGRAM_API_BASE, &api_base);
    std::env::set_var(ENV_DOCKER_HOST, closed_port_url());

    let result = bootstrap();
    clear_workbot_env();
    server.join().expect("join mock server");
    result.expect("bootstrap succeeds");

    assert_eq!(
        acl.membership(9).expect("membership"),
        Membership::Unauthorized
    );
}

#[test]
fn stop_signal_file_ends_the_poll_loop() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_workbot_env();
    let dir = tempdir().expect("tempdir");
    let stop_file = dir.path().join("stop");

    // First call is the bootstrap getMe; the second is one empty poll, after
    // which the responder drops the stop file for the next loop iteration.
    let stop_file_for_server = stop_file.clone();
    let (api_base, server) = start_mock_bot_api(2, move |path| {
        if path.ends_with("/getMe") {
            return r#"{"ok":true,"result":{"id":1,"first_name":"workbot"}}"#.to_string();
        }
        assert!(path.ends_with("/getUpdates"), "unexpected call to {path}");
        fs::write(&stop_file_for_server, b"stop").expect("write stop file");
        r#"{"ok":true,"result":[]}"#.to_string()
    });

    std::env::set_var(ENV_BOT_TOKEN, "123:abc");
    std::env::set_var(ENV_STATE_ROOT, dir.path());
    std::env::set_var(ENV_TELEGRAM_API_BASE, &api_base);
    std::env::set_var(ENV_DOCKER_HOST, closed_port_url());

    let result = bootstrap();
    clear_workbot_env();
    let bot = result.expect("bootstrap succeeds");

    let stop = AtomicBool::new(false);
    bot.run_until_stop(&stop);
    server.join().expect("join mock server");

    assert!(read_log(dir.path()).contains("stop signal received"));
}

fn read_log(state_root: &Path) -> String {
    fs::read_to_string(event_log_path(state_root)).unwrap_or_default()
}
