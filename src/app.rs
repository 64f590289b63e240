use std::path::PathBuf;

use futures::StreamExt;
use iced::Task;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::application::{
    check_dependencies, run_process, DependencyReport, SetupCoordinator, TaskSlot,
};
use crate::domain::{TaskError, TaskEvent, TaskKind, TaskOutcome};
use crate::platform;
use crate::settings::{settings_path, Settings};
use crate::ui::{DownloadMessage, DownloadView};
use crate::utils::{ensure_directory, format_command_line};

pub struct DownloadApp {
    view: DownloadView,
    setup: SetupCoordinator,
    settings: Settings,
    settings_path: PathBuf,
    slot: TaskSlot,
    // Last completed check; replaced wholesale, never patched in place
    dependencies: Option<DependencyReport>,
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(DownloadMessage),
    DependenciesChecked(DependencyReport),
    DirectoryPicked(Option<PathBuf>),
    Task(TaskEvent),
    ShortcutCreated(Result<PathBuf, TaskError>),
    NoticeClosed,
}

impl DownloadApp {
    pub fn new(settings_path: PathBuf) -> Self {
        let settings = Settings::load(&settings_path);
        let mut view = DownloadView {
            advanced_visible: settings.advanced_visible,
            ..DownloadView::default()
        };
        view.download_dir = settings
            .download_dir
            .clone()
            .unwrap_or_else(|| platform::default_download_dir().display().to_string());

        Self {
            view,
            setup: SetupCoordinator::new(ApiClient::new(Default::default())),
            settings,
            settings_path,
            slot: TaskSlot::default(),
            dependencies: None,
        }
    }

    /// Startup state plus the initial dependency check.
    pub fn boot() -> (Self, Task<Message>) {
        let app = Self::new(settings_path());
        (app, check_dependencies_task())
    }

    fn save_settings(&mut self) {
        self.settings.download_dir = Some(self.view.download_dir.trim().to_string())
            .filter(|dir| !dir.is_empty());
        self.settings.advanced_visible = self.view.advanced_visible;
        if let Err(e) = self.settings.save(&self.settings_path) {
            log::warn!("failed to save settings: {e}");
            self.view.append_log(format!("Failed to save settings: {e}"));
        }
    }

    fn start_download(&mut self) -> Task<Message> {
        let options = self.view.options();
        let args = match options.build_arguments() {
            Ok(args) => args,
            Err(e) => return self.report_error(e),
        };
        if let Err(e) = ensure_directory(&options.output_dir) {
            return self.report_error(e);
        }

        let program = self
            .dependencies
            .as_ref()
            .map(DependencyReport::ytdlp_program)
            .unwrap_or_else(|| PathBuf::from(platform::executable_name()));

        let cancel = match self.begin(TaskKind::Download) {
            Ok(cancel) => cancel,
            Err(e) => return self.report_error(e),
        };
        self.view.progress = 0;
        self.view.status_message = "Downloading...".to_string();
        self.view
            .append_log(format!("Running command: {}", format_command_line(&program, &args)));

        Task::stream(run_process(program, args, cancel).map(Message::Task))
    }

    fn start_fetch_binary(&mut self) -> Task<Message> {
        let cancel = match self.begin(TaskKind::FetchBinary) {
            Ok(cancel) => cancel,
            Err(e) => return self.report_error(e),
        };
        self.view.status_message = "Fetching yt-dlp...".to_string();
        let stream = self.setup.fetch_binary(
            platform::release_asset_name().to_string(),
            platform::managed_binary_path(),
            cancel,
        );
        Task::stream(stream.map(Message::Task))
    }

    fn start_install_packages(&mut self) -> Task<Message> {
        let Some(report) = self.dependencies.clone() else {
            self.view
                .append_log("Dependency check has not finished yet.");
            return Task::none();
        };
        let Some(python) = report.python else {
            return self.report_error(TaskError::ExecutableNotFound(
                "Python interpreter".to_string(),
            ));
        };
        if report.missing_packages.is_empty() {
            self.view.append_log("All Python packages are already installed.");
            return Task::none();
        }

        let cancel = match self.begin(TaskKind::InstallPackages) {
            Ok(cancel) => cancel,
            Err(e) => return self.report_error(e),
        };
        self.view.status_message = "Installing packages...".to_string();
        let stream = self
            .setup
            .install_packages(python, report.missing_packages, cancel);
        Task::stream(stream.map(Message::Task))
    }

    /// Claim the task slot. A busy slot is reported like any other error.
    fn begin(&mut self, kind: TaskKind) -> Result<CancellationToken, TaskError> {
        let token = self.slot.begin(kind).inspect_err(|_| {
            log::warn!("{kind} rejected while {:?} is running", self.slot.kind());
        })?;
        self.view.is_busy = true;
        Ok(token)
    }

    fn handle_event(&mut self, event: TaskEvent) -> Task<Message> {
        match event {
            TaskEvent::Output(line) => {
                if let Some(percent) = line.percent {
                    self.view.progress = percent;
                    self.view.status_message = format!("Downloading: {percent}%");
                }
                self.view.append_log(line.text);
                Task::none()
            }
            TaskEvent::Setup(message) => {
                self.view.status_message = message.lines().next().unwrap_or_default().to_string();
                self.view.append_log(message);
                Task::none()
            }
            TaskEvent::Finished(outcome) => self.handle_finished(outcome),
        }
    }

    fn handle_finished(&mut self, outcome: TaskOutcome) -> Task<Message> {
        let kind = self.slot.finish();
        self.view.is_busy = false;
        log::info!(
            "task {:?} finished (success: {}): {}",
            kind,
            outcome.is_success(),
            outcome.message()
        );

        match outcome {
            TaskOutcome::Succeeded(message) => {
                if kind == Some(TaskKind::Download) {
                    self.view.progress = 100;
                }
                self.view.status_message = message.clone();
                self.view.append_log(message);
                match kind {
                    Some(TaskKind::FetchBinary) | Some(TaskKind::InstallPackages) => {
                        check_dependencies_task()
                    }
                    _ => Task::none(),
                }
            }
            TaskOutcome::Cancelled => {
                self.view.status_message = "Cancelled".to_string();
                self.view.append_log("Task cancelled.");
                Task::none()
            }
            TaskOutcome::Failed(e) => self.report_error(e),
        }
    }

    /// Append to the log and raise a blocking notice.
    fn report_error(&mut self, error: TaskError) -> Task<Message> {
        let message = error.to_string();
        log::error!("{message}");
        self.view.status_message = format!("Error: {message}");
        self.view.append_log(format!("Error: {message}"));
        Task::perform(show_notice(message), |_| Message::NoticeClosed)
    }
}

fn check_dependencies_task() -> Task<Message> {
    Task::perform(
        check_dependencies(platform::managed_binary_path()),
        Message::DependenciesChecked,
    )
}

async fn show_notice(message: String) {
    rfd::AsyncMessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title("yt-dlp GUI")
        .set_description(message)
        .set_buttons(rfd::MessageButtons::Ok)
        .show()
        .await;
}

pub fn update(app: &mut DownloadApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => {
            app.view.update(ui_msg.clone());

            match ui_msg {
                DownloadMessage::DownloadPressed => return app.start_download(),
                DownloadMessage::CancelPressed => {
                    if app.slot.cancel() {
                        app.view.status_message = "Cancelling...".to_string();
                    }
                }
                DownloadMessage::BrowsePressed => {
                    let start = PathBuf::from(app.view.download_dir.trim());
                    return Task::perform(
                        async move {
                            let mut dialog =
                                rfd::AsyncFileDialog::new().set_title("Select Download Location");
                            if start.is_dir() {
                                dialog = dialog.set_directory(&start);
                            }
                            dialog
                                .pick_folder()
                                .await
                                .map(|handle| handle.path().to_path_buf())
                        },
                        Message::DirectoryPicked,
                    );
                }
                DownloadMessage::DownloadDirChanged(_) | DownloadMessage::AdvancedToggled(_) => {
                    app.save_settings();
                }
                DownloadMessage::CheckDependenciesPressed => {
                    app.view.status_message = "Checking dependencies...".to_string();
                    return check_dependencies_task();
                }
                DownloadMessage::FetchBinaryPressed => return app.start_fetch_binary(),
                DownloadMessage::InstallPackagesPressed => return app.start_install_packages(),
                DownloadMessage::CreateShortcutPressed => {
                    return Task::perform(
                        async {
                            let exe = std::env::current_exe()?;
                            let desktop = dirs::desktop_dir().ok_or_else(|| {
                                TaskError::InvalidInput("No desktop directory found".to_string())
                            })?;
                            platform::create_desktop_shortcut(&exe, &desktop)
                        },
                        Message::ShortcutCreated,
                    );
                }
                _ => {}
            }
        }
        Message::DependenciesChecked(report) => {
            for line in report.summary() {
                app.view.append_log(line);
            }
            app.view.status_message = if report.ytdlp.is_some() {
                "Ready".to_string()
            } else {
                "yt-dlp not found: use Advanced > Download yt-dlp".to_string()
            };
            app.dependencies = Some(report);
        }
        Message::DirectoryPicked(Some(dir)) => {
            app.view.download_dir = dir.display().to_string();
            app.save_settings();
        }
        Message::DirectoryPicked(None) => {}
        Message::Task(event) => return app.handle_event(event),
        Message::ShortcutCreated(Ok(path)) => {
            app.view
                .append_log(format!("Desktop shortcut created: {}", path.display()));
        }
        Message::ShortcutCreated(Err(e)) => return app.report_error(e),
        Message::NoticeClosed => {}
    }
    Task::none()
}

pub fn view(app: &DownloadApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::UiMessage)
}
