use std::str::FromStr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::{spawn, task};
use tokio_util::sync::CancellationToken;

use crate::observable::ObservableValue;

/// The live state of the drone, as reported in one telemetry telegram.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Telemetry {
    pub roll: i16,
    pub pitch: i16,
    pub yaw: i16,
    pub height: i16,
    pub barometer: f32,
    pub battery: u8,
    pub time_of_flight: u16,
    pub motor_time: u16,
    pub temperature_low: i16,
    pub temperature_high: i16,
    pub velocity: Vector3<i16>,
    pub acceleration: Vector3<f32>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Vector3<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}

impl Telemetry {
    /// Parses a state telegram received from the drone.
    ///
    /// Example message:
    /// "mid:-1;x:-100;y:-100;z:-100;mpry:-1,-1,-1;pitch:0;roll:0;yaw:-3;vgx:0;vgy:0;vgz:1;templ:58;temph:60;tof:71;h:50;bat:82;baro:-57.14;time:14;agx:17.00;agy:-4.00;agz:-956.00;"
    ///
    /// Parsing is deliberately lenient: unrecognized keys and malformed
    /// tokens are skipped, leaving the affected field at its default. The
    /// drone sends a fresh telegram every few hundred milliseconds, so one
    /// bad field is not worth failing over.
    pub fn from_telegram(s: &str) -> Telemetry {
        let mut state = Telemetry::default();

        for token in s.split(';') {
            let Some((k, v)) = token.split_once(':') else {
                continue;
            };

            match k {
                "roll" => assign(&mut state.roll, v),
                "pitch" => assign(&mut state.pitch, v),
                "yaw" => assign(&mut state.yaw, v),
                "h" => assign(&mut state.height, v),
                "baro" => assign(&mut state.barometer, v),
                "bat" => assign(&mut state.battery, v),
                "tof" => assign(&mut state.time_of_flight, v),
                "time" => assign(&mut state.motor_time, v),
                "templ" => assign(&mut state.temperature_low, v),
                "temph" => assign(&mut state.temperature_high, v),
                "vgx" => assign(&mut state.velocity.x, v),
                "vgy" => assign(&mut state.velocity.y, v),
                "vgz" => assign(&mut state.velocity.z, v),
                "agx" => assign(&mut state.acceleration.x, v),
                "agy" => assign(&mut state.acceleration.y, v),
                "agz" => assign(&mut state.acceleration.z, v),
                _ => {}
            }
        }

        state
    }
}

fn assign<T: FromStr>(field: &mut T, raw: &str) {
    if let Ok(v) = raw.parse() {
        *field = v;
    }
}

/// Receives state telegrams for the lifetime of the connection and
/// republishes them as observable values.
///
/// A malformed or missing datagram never terminates listening; receive
/// errors are logged and the loop carries on until the token is cancelled.
pub(crate) fn spawn_state_listener(
    sock: UdpSocket,
    telemetry: Arc<ObservableValue<Telemetry>>,
    battery: Arc<ObservableValue<u8>>,
    token: CancellationToken,
) -> task::JoinHandle<()> {
    spawn(async move {
        log::info!("state listener running at {:?}", sock.local_addr());
        let mut buf = vec![0; 1024];
        loop {
            let received = tokio::select! {
                _ = token.cancelled() => break,
                r = sock.recv(&mut buf) => r,
            };
            let n = match received {
                Ok(n) => n,
                Err(err) => {
                    log::warn!("can't receive state: {err}");
                    continue;
                }
            };

            let telegram = String::from_utf8_lossy(&buf[..n]);
            let state = Telemetry::from_telegram(telegram.trim());
            battery.set_if_changed(state.battery);
            telemetry.set(state);
        }
        log::info!("state listener stopped");
    })
}
