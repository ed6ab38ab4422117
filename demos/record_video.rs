extern crate tello_flix;

use tello_flix::Tello;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut drone = Tello::new();
    drone.connect().await?;
    drone.start_video().await?;

    let path = drone.start_recording()?;
    println!("recording to {}", path.display());

    drone.take_off().await?;
    drone.turn_clockwise(360).await?;
    drone.land().await?;

    drone.stop_recording()?;
    drone.stop_video().await?;
    drone.disconnect();
    Ok(())
}
