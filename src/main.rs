use nilwindows::config;
use nilwindows::config::Config;
use nilwindows::Error;

use std::process::ExitCode;

fn load_config() -> Result<Config, Error> {
    let path = nilwindows::get_data_path(config::CONFIG_FILE_NAME);
    Config::load_or_default(&path)
}

#[cfg(target_os = "windows")]
fn run(config: Config) -> Result<(), Error> {
    use nilwindows::client::Client;
    use nilwindows::prelude::{gfx_platform, os_platform};

    let mut client = Client::<gfx_platform::Device, os_platform::App>::create(config.into())?;
    client.run()
}

#[cfg(not(target_os = "windows"))]
fn run(_config: Config) -> Result<(), Error> {
    Err(Error::Device("nilwindows requires Windows and Direct3D 12".to_string()))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = load_config().and_then(run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("nilwindows: {}", err);
            ExitCode::FAILURE
        }
    }
}
