//! `devices`: list cameras and microphones

use crate::capture::{get_audio_input_devices, get_cameras};
use crate::utils::error::AppResult;

pub fn list_devices(json: bool) -> AppResult<()> {
    let cameras = get_cameras();
    let microphones = get_audio_input_devices();

    if json {
        let listing = serde_json::json!({
            "cameras": cameras,
            "microphones": microphones,
        });
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if cameras.is_empty() {
        println!("No cameras found.");
    } else {
        println!("Cameras:");
        for (index, camera) in cameras.iter().enumerate() {
            println!("  [{}] {}", index, camera.name);
        }
    }
    println!();

    if microphones.is_empty() {
        println!("No microphones found.");
    } else {
        println!("Microphones:");
        for microphone in &microphones {
            let marker = if microphone.is_default { " (default)" } else { "" };
            println!("  {}{}", microphone.name, marker);
        }
    }

    Ok(())
}
