//! Session tests against a scripted UDP responder standing in for the
//! drone on loopback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

use tello_flix::{SessionState, Tello, TelloError, TelloOptions};

type CommandLog = Arc<Mutex<Vec<String>>>;

/// Binds a fake drone on an ephemeral loopback port. `reply` decides what,
/// if anything, each received command line gets back.
async fn scripted_drone<F>(reply: F) -> (u16, CommandLog)
where
    F: Fn(&str) -> Option<String> + Send + 'static,
{
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();
    let commands: CommandLog = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&commands);
    tokio::spawn(async move {
        let mut buf = vec![0; 1024];
        loop {
            let Ok((n, from)) = sock.recv_from(&mut buf).await else {
                break;
            };
            let line = String::from_utf8_lossy(&buf[..n]).to_string();
            log.lock().await.push(line.clone());
            if let Some(reply) = reply(&line) {
                let _ = sock.send_to(reply.as_bytes(), from).await;
            }
        }
    });

    (port, commands)
}

fn options_for(command_port: u16) -> TelloOptions {
    let mut options = TelloOptions::default();
    options.drone_host = "127.0.0.1".to_string();
    options.command_port = command_port;
    // ephemeral so parallel tests don't fight over the default port
    options.state_port = 0;
    options.local_address = "127.0.0.1".to_string();
    options.response_timeout = Duration::from_millis(500);
    options
}

fn always_ok(_command: &str) -> Option<String> {
    Some("ok".to_string())
}

#[tokio::test]
async fn connect_then_take_off_succeeds() {
    let (port, commands) = scripted_drone(always_ok).await;
    let mut drone = Tello::with_options(options_for(port));

    drone.connect().await.unwrap();
    assert!(drone.is_connected());

    drone.take_off().await.unwrap();

    let log = commands.lock().await;
    assert_eq!(*log, vec!["command".to_string(), "takeoff".to_string()]);
}

#[tokio::test]
async fn handshake_rejection_leaves_session_disconnected() {
    let (port, _) = scripted_drone(|_| Some("error".to_string())).await;
    let mut drone = Tello::with_options(options_for(port));

    let err = drone.connect().await.unwrap_err();
    assert!(matches!(err, TelloError::CommandRejected { .. }));
    assert!(!drone.is_connected());
}

#[tokio::test]
async fn unresolved_host_is_reported() {
    let mut options = options_for(8889);
    options.drone_host = "no-such-drone.invalid".to_string();
    let mut drone = Tello::with_options(options);

    let err = drone.connect().await.unwrap_err();
    assert!(matches!(err, TelloError::UnresolvedHost { .. }));
}

#[tokio::test]
async fn silent_drone_yields_no_response_in_bounded_time() {
    // replies to the handshake, then goes silent
    let (port, _) = scripted_drone(|command| {
        (command == "command").then(|| "ok".to_string())
    })
    .await;
    let mut drone = Tello::with_options(options_for(port));
    drone.connect().await.unwrap();

    let started = Instant::now();
    let err = drone.take_off().await.unwrap_err();
    assert!(matches!(err, TelloError::NoResponse(_)));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn concurrent_commands_arrive_in_submission_order() {
    let (port, commands) = scripted_drone(always_ok).await;
    let mut drone = Tello::with_options(options_for(port));
    drone.connect().await.unwrap();

    let (a, b, c) = tokio::join!(drone.forward(100), drone.back(50), drone.up(30));
    a.unwrap();
    b.unwrap();
    c.unwrap();

    let log = commands.lock().await;
    assert_eq!(
        *log,
        vec![
            "command".to_string(),
            "forward 100".to_string(),
            "back 50".to_string(),
            "up 30".to_string(),
        ]
    );
}

#[tokio::test]
async fn emergency_races_ahead_of_a_waiting_command() {
    // the handshake gets a reply; "takeoff" is left hanging
    let (port, commands) = scripted_drone(|command| {
        (command == "command").then(|| "ok".to_string())
    })
    .await;
    let mut drone = Tello::with_options(options_for(port));
    drone.connect().await.unwrap();

    let (take_off, emergency) = tokio::join!(drone.take_off(), async {
        sleep(Duration::from_millis(100)).await;
        drone.emergency().await
    });
    assert!(matches!(take_off, Err(TelloError::NoResponse(_))));
    emergency.unwrap();

    let log = commands.lock().await;
    // emergency hit the wire while takeoff was still awaiting its reply
    assert_eq!(
        *log,
        vec![
            "command".to_string(),
            "takeoff".to_string(),
            "emergency".to_string(),
        ]
    );
}

#[tokio::test]
async fn rc_updates_are_fire_and_forget_and_clamped() {
    let (port, commands) = scripted_drone(|command| {
        (!command.starts_with("rc")).then(|| "ok".to_string())
    })
    .await;
    let mut drone = Tello::with_options(options_for(port));
    drone.connect().await.unwrap();

    drone.set_forward_back(30).await.unwrap();
    drone.set_yaw(250).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let log = commands.lock().await;
    assert_eq!(
        *log,
        vec![
            "command".to_string(),
            "rc 0 30 0 0".to_string(),
            "rc 0 30 0 100".to_string(),
        ]
    );
}

#[tokio::test]
async fn read_queries_parse_leniently() {
    let (port, _) = scripted_drone(|command| {
        Some(match command {
            "battery?" => "87".to_string(),
            "time?" => "12s".to_string(),
            "sn?" => "0TQZK7AABBCCDD".to_string(),
            _ => "ok".to_string(),
        })
    })
    .await;
    let mut drone = Tello::with_options(options_for(port));
    drone.connect().await.unwrap();

    assert_eq!(drone.battery().await.unwrap(), 87);
    assert_eq!(drone.flight_time().await.unwrap(), 12);
    assert_eq!(drone.serial_number().await.unwrap(), "0TQZK7AABBCCDD");
}

#[tokio::test]
async fn telemetry_telegrams_update_the_observables() {
    let (port, _) = scripted_drone(always_ok).await;

    // pick a free port for the state listener up front so the fake drone
    // knows where to send telegrams
    let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let state_port = probe.local_addr().unwrap().port();
    drop(probe);

    let mut options = options_for(port);
    options.state_port = state_port;
    let mut drone = Tello::with_options(options);
    drone.connect().await.unwrap();

    let mut battery = drone.observe_battery();
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender
        .send_to(b"bat:87;pitch:0;roll:1;foo:9;", ("127.0.0.1", state_port))
        .await
        .unwrap();

    timeout(Duration::from_secs(2), battery.changed())
        .await
        .expect("battery update arrived")
        .unwrap();
    assert_eq!(*battery.borrow_and_update(), 87);

    let telemetry = drone.telemetry();
    assert_eq!(telemetry.battery, 87);
    assert_eq!(telemetry.roll, 1);
}

#[tokio::test]
async fn disconnect_is_idempotent_and_blocks_further_commands() {
    let (port, _) = scripted_drone(always_ok).await;
    let mut drone = Tello::with_options(options_for(port));

    drone.connect().await.unwrap();
    assert_eq!(drone.observe_session_state().borrow().clone(), SessionState::Connected);

    drone.disconnect();
    drone.disconnect();
    assert!(!drone.is_connected());

    assert!(matches!(drone.take_off().await, Err(TelloError::NotConnected)));
}
