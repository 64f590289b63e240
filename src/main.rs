mod api;
mod app;
mod application;
mod domain;
mod platform;
mod settings;
mod ui;
mod utils;

use iced::window;

fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("starting yt-dlp GUI {}", env!("CARGO_PKG_VERSION"));

    iced::application(app::DownloadApp::boot, app::update, app::view)
        .title("yt-dlp GUI")
        .window(window::Settings {
            size: iced::Size::new(900.0, 760.0),
            ..Default::default()
        })
        .run()
}
