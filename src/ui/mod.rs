use std::path::PathBuf;

use iced::{
    widget::{
        button, column, pick_list, progress_bar, row, scrollable, text, text_input, toggler,
        Column, Space,
    },
    Element, Length,
};

use crate::domain::{command::DEFAULT_OUTPUT_TEMPLATE, DownloadOptions, FormatPreset};

/// Form and log state owned by the UI thread
pub struct DownloadView {
    pub url: String,
    pub download_dir: String,
    pub output_template: String,
    pub preset: FormatPreset,
    pub format_code: String,
    pub ignore_config: bool,
    pub no_mtime: bool,
    pub embed_thumbnail: bool,
    pub add_metadata: bool,
    pub sponsorblock: bool,
    pub embed_subs: bool,
    pub rate_limit: String,
    pub cookies_file: String,
    pub cookies_from_browser: String,
    pub custom_args: String,
    pub advanced_visible: bool,
    pub status_message: String,
    pub progress: u8,
    pub is_busy: bool,
    pub log: Vec<String>,
}

const MAX_LOG_LINES: usize = 5000;

impl Default for DownloadView {
    fn default() -> Self {
        Self {
            url: String::new(),
            download_dir: String::new(),
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            preset: FormatPreset::default(),
            format_code: String::new(),
            ignore_config: false,
            no_mtime: false,
            embed_thumbnail: false,
            add_metadata: false,
            sponsorblock: false,
            embed_subs: false,
            rate_limit: String::new(),
            cookies_file: String::new(),
            cookies_from_browser: String::new(),
            custom_args: String::new(),
            advanced_visible: false,
            status_message: "Enter a URL to download".to_string(),
            progress: 0,
            is_busy: false,
            log: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DownloadMessage {
    UrlChanged(String),
    DownloadDirChanged(String),
    OutputTemplateChanged(String),
    PresetSelected(FormatPreset),
    FormatCodeChanged(String),
    IgnoreConfigToggled(bool),
    NoMtimeToggled(bool),
    EmbedThumbnailToggled(bool),
    AddMetadataToggled(bool),
    SponsorblockToggled(bool),
    EmbedSubsToggled(bool),
    RateLimitChanged(String),
    CookiesFileChanged(String),
    CookiesFromBrowserChanged(String),
    CustomArgsChanged(String),
    ClearLog,
    // Handled by the app
    BrowsePressed,
    AdvancedToggled(bool),
    DownloadPressed,
    CancelPressed,
    CheckDependenciesPressed,
    FetchBinaryPressed,
    InstallPackagesPressed,
    CreateShortcutPressed,
}

impl DownloadView {
    pub fn update(&mut self, message: DownloadMessage) {
        match message {
            DownloadMessage::UrlChanged(url) => self.url = url,
            DownloadMessage::DownloadDirChanged(dir) => self.download_dir = dir,
            DownloadMessage::OutputTemplateChanged(template) => self.output_template = template,
            DownloadMessage::PresetSelected(preset) => self.preset = preset,
            DownloadMessage::FormatCodeChanged(code) => self.format_code = code,
            DownloadMessage::IgnoreConfigToggled(on) => self.ignore_config = on,
            DownloadMessage::NoMtimeToggled(on) => self.no_mtime = on,
            DownloadMessage::EmbedThumbnailToggled(on) => self.embed_thumbnail = on,
            DownloadMessage::AddMetadataToggled(on) => self.add_metadata = on,
            DownloadMessage::SponsorblockToggled(on) => self.sponsorblock = on,
            DownloadMessage::EmbedSubsToggled(on) => self.embed_subs = on,
            DownloadMessage::RateLimitChanged(rate) => self.rate_limit = rate,
            DownloadMessage::CookiesFileChanged(file) => self.cookies_file = file,
            DownloadMessage::CookiesFromBrowserChanged(browser) => {
                self.cookies_from_browser = browser
            }
            DownloadMessage::CustomArgsChanged(args) => self.custom_args = args,
            DownloadMessage::AdvancedToggled(on) => self.advanced_visible = on,
            DownloadMessage::ClearLog => self.log.clear(),
            DownloadMessage::BrowsePressed
            | DownloadMessage::DownloadPressed
            | DownloadMessage::CancelPressed
            | DownloadMessage::CheckDependenciesPressed
            | DownloadMessage::FetchBinaryPressed
            | DownloadMessage::InstallPackagesPressed
            | DownloadMessage::CreateShortcutPressed => {
                // Will be handled by the app
            }
        }
    }

    pub fn options(&self) -> DownloadOptions {
        DownloadOptions {
            url: self.url.clone(),
            output_dir: PathBuf::from(self.download_dir.trim()),
            output_template: self.output_template.clone(),
            preset: self.preset,
            format_code: self.format_code.clone(),
            ignore_config: self.ignore_config,
            no_mtime: self.no_mtime,
            embed_thumbnail: self.embed_thumbnail,
            add_metadata: self.add_metadata,
            sponsorblock: self.sponsorblock,
            embed_subs: self.embed_subs,
            rate_limit: self.rate_limit.clone(),
            cookies_file: self.cookies_file.clone(),
            cookies_from_browser: self.cookies_from_browser.clone(),
            custom_args: self.custom_args.clone(),
        }
    }

    pub fn append_log(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
        if self.log.len() > MAX_LOG_LINES {
            let excess = self.log.len() - MAX_LOG_LINES;
            self.log.drain(..excess);
        }
    }

    pub fn view(&self) -> Element<'_, DownloadMessage> {
        let idle = !self.is_busy;

        let download_row = row![
            text_input("Download location...", &self.download_dir)
                .on_input(DownloadMessage::DownloadDirChanged)
                .padding(8),
            button("Browse")
                .on_press_maybe(idle.then_some(DownloadMessage::BrowsePressed))
                .padding([8, 16]),
        ]
        .spacing(10);

        let format_row = row![
            pick_list(
                FormatPreset::ALL,
                Some(self.preset),
                DownloadMessage::PresetSelected
            ),
            text_input("Format code (optional, e.g. 137+140)", &self.format_code)
                .on_input(DownloadMessage::FormatCodeChanged)
                .padding(8),
        ]
        .spacing(10);

        let embed_row = row![
            toggler(self.embed_thumbnail)
                .label("Embed thumbnail")
                .on_toggle(DownloadMessage::EmbedThumbnailToggled),
            toggler(self.add_metadata)
                .label("Add metadata")
                .on_toggle(DownloadMessage::AddMetadataToggled),
            toggler(self.sponsorblock)
                .label("SponsorBlock")
                .on_toggle(DownloadMessage::SponsorblockToggled),
            toggler(self.embed_subs)
                .label("Embed subtitles")
                .on_toggle(DownloadMessage::EmbedSubsToggled),
        ]
        .spacing(20);

        let actions = row![
            button("Download")
                .on_press_maybe(idle.then_some(DownloadMessage::DownloadPressed))
                .padding([10, 20]),
            button("Cancel")
                .on_press_maybe(self.is_busy.then_some(DownloadMessage::CancelPressed))
                .padding([10, 20]),
            Space::new().width(Length::Fill),
            toggler(self.advanced_visible)
                .label("Advanced")
                .on_toggle(DownloadMessage::AdvancedToggled),
        ]
        .spacing(10);

        let mut form = column![
            text("yt-dlp GUI").size(28),
            text("Video / playlist / channel URL:").size(16),
            text_input("https://...", &self.url)
                .on_input(DownloadMessage::UrlChanged)
                .padding(8),
            text("Download location:").size(16),
            download_row,
            text("Output template:").size(16),
            text_input(DEFAULT_OUTPUT_TEMPLATE, &self.output_template)
                .on_input(DownloadMessage::OutputTemplateChanged)
                .padding(8),
            format_row,
            embed_row,
        ]
        .spacing(8);

        if self.advanced_visible {
            form = form.push(self.advanced_panel(idle));
        }

        let log_lines = Column::with_children(
            self.log
                .iter()
                .map(|line| text(line.as_str()).size(13).into()),
        )
        .spacing(2);

        column![
            form,
            actions,
            progress_bar(0.0..=100.0, f32::from(self.progress)),
            text(&self.status_message).size(14),
            scrollable(log_lines)
                .height(Length::Fill)
                .width(Length::Fill),
            button("Clear log")
                .on_press(DownloadMessage::ClearLog)
                .padding([4, 12]),
        ]
        .padding(20)
        .spacing(10)
        .into()
    }

    fn advanced_panel(&self, idle: bool) -> Element<'_, DownloadMessage> {
        let setup_row = row![
            button("Check dependencies")
                .on_press_maybe(idle.then_some(DownloadMessage::CheckDependenciesPressed)),
            button("Download yt-dlp")
                .on_press_maybe(idle.then_some(DownloadMessage::FetchBinaryPressed)),
            button("Install missing packages")
                .on_press_maybe(idle.then_some(DownloadMessage::InstallPackagesPressed)),
            button("Create desktop shortcut")
                .on_press_maybe(idle.then_some(DownloadMessage::CreateShortcutPressed)),
        ]
        .spacing(10);

        column![
            row![
                toggler(self.ignore_config)
                    .label("Ignore config files")
                    .on_toggle(DownloadMessage::IgnoreConfigToggled),
                toggler(self.no_mtime)
                    .label("Don't set file mtime")
                    .on_toggle(DownloadMessage::NoMtimeToggled),
            ]
            .spacing(20),
            row![
                text_input("Rate limit (e.g. 2M)", &self.rate_limit)
                    .on_input(DownloadMessage::RateLimitChanged)
                    .padding(8),
                text_input("Cookies file", &self.cookies_file)
                    .on_input(DownloadMessage::CookiesFileChanged)
                    .padding(8),
                text_input("Cookies from browser", &self.cookies_from_browser)
                    .on_input(DownloadMessage::CookiesFromBrowserChanged)
                    .padding(8),
            ]
            .spacing(10),
            text("Custom yt-dlp arguments:").size(16),
            text_input("--max-downloads 5 \"My File.mp4\"", &self.custom_args)
                .on_input(DownloadMessage::CustomArgsChanged)
                .padding(8),
            setup_row,
        ]
        .spacing(8)
        .into()
    }
}
