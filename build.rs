use std::fs;
use std::path::Path;

fn main() -> anyhow::Result<()> {
    // Read update endpoint configuration if it exists
    let update_config_path = "update_config.h";

    let mut version_url = String::from("http://127.0.0.1:5000/version");
    let mut firmware_url = String::from("http://127.0.0.1:5000/firmware");
    let mut auth_token = String::new();

    if Path::new(update_config_path).exists() {
        let contents = fs::read_to_string(update_config_path)?;

        // Parse version endpoint
        if let Some(line) = contents.lines().find(|l| l.contains("#define UPDATE_VERSION_URL")) {
            if let Some(url) = line.split('"').nth(1) {
                version_url = url.to_string();
            }
        }

        // Parse firmware endpoint
        if let Some(line) = contents.lines().find(|l| l.contains("#define UPDATE_FIRMWARE_URL")) {
            if let Some(url) = line.split('"').nth(1) {
                firmware_url = url.to_string();
            }
        }

        // Parse shared secret
        if let Some(line) = contents.lines().find(|l| l.contains("#define UPDATE_AUTH_TOKEN")) {
            if let Some(token) = line.split('"').nth(1) {
                auth_token = token.to_string();
            }
        }
    } else {
        println!("cargo:warning=update_config.h not found! Copy update_config.h.example to update_config.h and set your endpoints and token.");
    }

    println!("cargo:rustc-env=UPDATE_VERSION_URL={}", version_url);
    println!("cargo:rustc-env=UPDATE_FIRMWARE_URL={}", firmware_url);
    println!("cargo:rustc-env=UPDATE_AUTH_TOKEN={}", auth_token);

    Ok(())
}
