//! Line-oriented operator console driving the pipeline and the boundaries.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::api::subjects::{find_subject, list_subjects, Subject};
use crate::api::upload::upload_image;
use crate::camera::error::CameraError;
use crate::pipeline::render::LabelFont;
use crate::pipeline::Pipeline;
use crate::preview::compress::compress_jpeg;
use crate::settings::form::{SettingsForm, LOAD_FAILED_NOTICE, SAVED_NOTICE, SAVE_FAILED_NOTICE};
use crate::settings::store::SettingsStore;
use crate::settings::types::SettingsField;

const SNAPSHOT_JPEG_QUALITY: u8 = 90;

pub const HELP: &str = "\
commands:
  start                       acquire the camera and start streaming
  stop                        stop streaming and release the camera
  select <id>|none            choose the subject attached to frames
  subjects                    list selectable subjects
  status                      session, channel and pipeline counters
  settings                    show saved and edited monitoring settings
  set <field> <value>         edit a setting (start, end, inactivity, no-person)
  save                        persist edited settings
  upload <image> [out.jpg]    run detection on one image
  snapshot <out.jpg>          write the current display to disk
  help                        this text
  quit                        shut down";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Select(Option<String>),
    Subjects,
    Status,
    Settings,
    Set { field: SettingsField, raw: String },
    Save,
    Upload {
        image: Option<PathBuf>,
        annotated: Option<PathBuf>,
    },
    Snapshot(PathBuf),
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();
        let command = match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("start", []) => Command::Start,
            ("stop", []) => Command::Stop,
            ("select", [id]) if id.eq_ignore_ascii_case("none") => Command::Select(None),
            ("select", [id]) => Command::Select(Some((*id).to_string())),
            ("subjects", []) => Command::Subjects,
            ("status", []) => Command::Status,
            ("settings", []) => Command::Settings,
            ("set", [field, value]) => Command::Set {
                field: field.parse().map_err(|e| format!("{e}"))?,
                raw: (*value).to_string(),
            },
            ("save", []) => Command::Save,
            ("upload", []) => Command::Upload {
                image: None,
                annotated: None,
            },
            ("upload", [image]) => Command::Upload {
                image: Some(PathBuf::from(image)),
                annotated: None,
            },
            ("upload", [image, out]) => Command::Upload {
                image: Some(PathBuf::from(image)),
                annotated: Some(PathBuf::from(out)),
            },
            ("snapshot", [out]) => Command::Snapshot(PathBuf::from(out)),
            ("help" | "?", []) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            _ => return Err(format!("unrecognised command '{}'; try 'help'", line.trim())),
        };
        Ok(Some(command))
    }
}

/// Result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nothing,
    Output(String),
    /// Blocking operator notice.
    Notice(String),
    Quit,
}

pub struct Shell {
    pipeline: Pipeline,
    client: ApiClient,
    store: Arc<dyn SettingsStore>,
    form: SettingsForm,
    subjects: Vec<Subject>,
    label_font: Option<LabelFont>,
}

impl Shell {
    pub fn new(pipeline: Pipeline, client: ApiClient, store: Arc<dyn SettingsStore>) -> Self {
        Self {
            pipeline,
            client,
            store,
            form: SettingsForm::new(),
            subjects: Vec::new(),
            label_font: None,
        }
    }

    /// Font for labels on annotated upload results.
    pub fn with_label_font(mut self, font: Option<LabelFont>) -> Self {
        self.label_font = font;
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn form(&self) -> &SettingsForm {
        &self.form
    }

    /// Load the subject list and the settings. Failures become notices.
    pub async fn bootstrap(&mut self) -> Vec<Reply> {
        let mut replies = Vec::new();
        if let Reply::Notice(n) = self.refresh_subjects().await {
            replies.push(Reply::Notice(n));
        }
        let store = Arc::clone(&self.store);
        let mut form = self.form.clone();
        match tokio::task::spawn_blocking(move || form.load(&*store).map(|()| form)).await {
            Ok(Ok(form)) => self.form = form,
            _ => replies.push(Reply::Notice(LOAD_FAILED_NOTICE.to_string())),
        }
        replies
    }

    pub async fn execute(&mut self, line: &str) -> Reply {
        match Command::parse(line) {
            Ok(Some(command)) => self.run(command).await,
            Ok(None) => Reply::Nothing,
            Err(message) => Reply::Output(message),
        }
    }

    pub async fn run(&mut self, command: Command) -> Reply {
        match command {
            Command::Start => match self.pipeline.start_session().await {
                Ok(()) => Reply::Output("streaming".to_string()),
                Err(e) => Reply::Notice(camera_notice(&e)),
            },
            Command::Stop => {
                self.pipeline.stop_session();
                Reply::Output("stopped".to_string())
            }
            Command::Select(id) => self.select(id),
            Command::Subjects => match self.refresh_subjects().await {
                Reply::Nothing => Reply::Output(self.subject_listing()),
                notice => notice,
            },
            Command::Status => Reply::Output(self.status()),
            Command::Settings => Reply::Output(self.settings_text()),
            Command::Set { field, raw } => {
                match field
                    .parse_value(&raw)
                    .and_then(|value| self.form.edit(field, value))
                {
                    Ok(()) => Reply::Output(format!("{field} = {}", self.form.draft().get(field))),
                    Err(e) => Reply::Output(e.to_string()),
                }
            }
            Command::Save => self.save_settings().await,
            Command::Upload { image, annotated } => self.upload(image, annotated).await,
            Command::Snapshot(path) => self.snapshot(&path),
            Command::Help => Reply::Output(HELP.to_string()),
            Command::Quit => Reply::Quit,
        }
    }

    /// Stop the pipeline for good.
    pub async fn shutdown(self) {
        self.pipeline.shutdown().await;
    }

    fn select(&mut self, id: Option<String>) -> Reply {
        let Some(id) = id else {
            self.pipeline.select_subject(None);
            return Reply::Output("no subject selected".to_string());
        };
        if !self.subjects.is_empty() && find_subject(&self.subjects, &id).is_none() {
            return Reply::Output(format!("unknown subject '{id}'; see 'subjects'"));
        }
        self.pipeline.select_subject(Some(&id));
        match find_subject(&self.subjects, &id) {
            Some(subject) => Reply::Output(format!("selected {subject}")),
            None => Reply::Output(format!("selected {id}")),
        }
    }

    async fn refresh_subjects(&mut self) -> Reply {
        let client = self.client.clone();
        match tokio::task::spawn_blocking(move || list_subjects(&client)).await {
            Ok(Ok(subjects)) => {
                self.subjects = subjects;
                Reply::Nothing
            }
            Ok(Err(e)) => Reply::Notice(api_notice(&e)),
            Err(e) => Reply::Notice(format!("load subjects failed: {e}")),
        }
    }

    fn subject_listing(&self) -> String {
        if self.subjects.is_empty() {
            return "no subjects".to_string();
        }
        let selected = self.pipeline.selected_subject();
        let mut out = String::new();
        for subject in &self.subjects {
            let marker = if selected.as_deref() == Some(subject.id.as_str()) {
                '*'
            } else {
                ' '
            };
            let _ = writeln!(out, "{marker} {}  {subject}", subject.id);
        }
        out.trim_end().to_string()
    }

    fn status(&self) -> String {
        let d = self.pipeline.diagnostics();
        let overlay = self.pipeline.overlay();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "session: {}",
            if self.pipeline.is_session_active() {
                "active"
            } else {
                "inactive"
            }
        );
        let _ = writeln!(out, "channel: {}", self.pipeline.channel_state());
        let _ = writeln!(
            out,
            "subject: {}",
            self.pipeline
                .selected_subject()
                .unwrap_or_else(|| "-".to_string())
        );
        let _ = writeln!(
            out,
            "detections: {} (update #{})",
            overlay.status_line(),
            overlay.sequence()
        );
        let _ = writeln!(
            out,
            "frames: sent {} skipped {} dropped {} encode-failed {}",
            d.frames_sent, d.frames_skipped, d.frames_dropped, d.encode_failures
        );
        let _ = writeln!(
            out,
            "results: applied {} parse-errors {} last {}",
            d.results_applied,
            d.parse_errors,
            d.ms_since_last_result
                .map(|ms| format!("{ms} ms ago"))
                .unwrap_or_else(|| "never".to_string())
        );
        let _ = write!(
            out,
            "render: cycles {} painted {} ({:.1} fps), upload {} B/s",
            d.render_cycles, d.painted_cycles, d.render_fps, d.upload_bps
        );
        out
    }

    fn settings_text(&self) -> String {
        let mut out = format!("Current Settings:\n{}", self.form.saved());
        if self.form.is_dirty() {
            let _ = write!(out, "\n\nUnsaved edits:\n{}", self.form.draft());
        }
        out
    }

    async fn save_settings(&mut self) -> Reply {
        let store = Arc::clone(&self.store);
        let mut form = self.form.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let result = form.save(&*store);
            (form, result)
        })
        .await;
        match joined {
            Ok((form, Ok(()))) => {
                self.form = form;
                Reply::Notice(SAVED_NOTICE.to_string())
            }
            Ok((_, Err(ApiError::Validation(message)))) => Reply::Notice(message),
            Ok((_, Err(_))) | Err(_) => Reply::Notice(SAVE_FAILED_NOTICE.to_string()),
        }
    }

    async fn upload(&mut self, image: Option<PathBuf>, annotated: Option<PathBuf>) -> Reply {
        let client = self.client.clone();
        let subject = self.pipeline.selected_subject();
        let font = self.label_font.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let response = upload_image(&client, image.as_deref(), subject.as_deref())?;
            let mut report = response.result.report();
            if let Some(out) = annotated {
                response.save_annotated(&out, font.as_ref())?;
                let _ = write!(report, "Image: {}", out.display());
            }
            Ok::<_, ApiError>(report)
        })
        .await;
        match joined {
            Ok(Ok(report)) => Reply::Output(report.trim_end().to_string()),
            Ok(Err(e)) => Reply::Notice(api_notice(&e)),
            Err(e) => Reply::Notice(format!("upload image failed: {e}")),
        }
    }

    fn snapshot(&self, path: &Path) -> Reply {
        let Some(image) = self.pipeline.surface_image() else {
            return Reply::Output("no display attached".to_string());
        };
        let Some(jpeg) = compress_jpeg(
            image.as_raw(),
            image.width(),
            image.height(),
            SNAPSHOT_JPEG_QUALITY,
        ) else {
            return Reply::Output("could not encode snapshot".to_string());
        };
        match std::fs::write(path, jpeg) {
            Ok(()) => Reply::Output(format!(
                "wrote {}x{} snapshot to {}",
                image.width(),
                image.height(),
                path.display()
            )),
            Err(e) => Reply::Notice(format!("snapshot failed: {e}")),
        }
    }
}

fn camera_notice(error: &CameraError) -> String {
    match error {
        CameraError::DeviceUnavailable(reason) => format!("Camera unavailable: {reason}"),
        other => format!("Camera error: {other}"),
    }
}

fn api_notice(error: &ApiError) -> String {
    error.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::Result as ApiResult;
    use crate::camera::backend::NullBackend;
    use crate::pipeline::PipelineConfig;
    use crate::settings::types::MonitoringSettings;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct MemoryStore {
        held: Mutex<MonitoringSettings>,
        fail: bool,
    }

    impl SettingsStore for MemoryStore {
        fn fetch(&self) -> ApiResult<MonitoringSettings> {
            if self.fail {
                return Err(ApiError::Status {
                    action: "load settings",
                    status: 500,
                });
            }
            Ok(*self.held.lock())
        }

        fn persist(&self, settings: &MonitoringSettings) -> ApiResult<MonitoringSettings> {
            if self.fail {
                return Err(ApiError::Status {
                    action: "save settings",
                    status: 500,
                });
            }
            *self.held.lock() = *settings;
            Ok(*settings)
        }
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn shell(fail_store: bool) -> Shell {
        let port = free_port();
        let config = PipelineConfig {
            ws_url: format!("ws://127.0.0.1:{port}/ws"),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::create(config, Arc::new(NullBackend));
        let base = format!("http://127.0.0.1:{port}");
        let client = ApiClient::new(&base, &base, Duration::from_secs(1));
        let store = Arc::new(MemoryStore {
            held: Mutex::new(MonitoringSettings::default()),
            fail: fail_store,
        });
        Shell::new(pipeline, client, store)
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("  ").unwrap(), None);
        assert_eq!(Command::parse("START").unwrap(), Some(Command::Start));
        assert_eq!(
            Command::parse("select none").unwrap(),
            Some(Command::Select(None))
        );
        assert_eq!(
            Command::parse("select e1").unwrap(),
            Some(Command::Select(Some("e1".to_string())))
        );
        assert_eq!(
            Command::parse("set start 8").unwrap(),
            Some(Command::Set {
                field: SettingsField::StartHour,
                raw: "8".to_string()
            })
        );
        assert!(Command::parse("set colour 8").is_err());
        assert!(Command::parse("launch").is_err());
        assert_eq!(Command::parse("exit").unwrap(), Some(Command::Quit));
    }

    #[tokio::test]
    async fn unavailable_camera_becomes_notice() {
        let mut shell = shell(false);
        let reply = shell.execute("start").await;
        assert_eq!(
            reply,
            Reply::Notice("Camera unavailable: no camera device found".to_string())
        );
        assert!(!shell.pipeline().is_session_active());
        shell.shutdown().await;
    }

    #[tokio::test]
    async fn bootstrap_reports_unreachable_services() {
        let mut shell = shell(true);
        let replies = shell.bootstrap().await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[1], Reply::Notice(LOAD_FAILED_NOTICE.to_string()));
        assert_eq!(*shell.form().saved(), MonitoringSettings::default());
        shell.shutdown().await;
    }

    #[tokio::test]
    async fn settings_edit_and_save() {
        let mut shell = shell(false);
        assert_eq!(
            shell.execute("set inactivity 42").await,
            Reply::Output("inactivity_threshold = 42".to_string())
        );
        assert!(matches!(shell.execute("settings").await, Reply::Output(t) if t.contains("Unsaved edits")));
        assert_eq!(
            shell.execute("save").await,
            Reply::Notice(SAVED_NOTICE.to_string())
        );
        assert_eq!(shell.form().saved().inactivity_threshold, 42);
        shell.shutdown().await;
    }

    #[tokio::test]
    async fn failed_save_keeps_draft() {
        let mut shell = shell(true);
        shell.execute("set end 20").await;
        assert_eq!(
            shell.execute("save").await,
            Reply::Notice(SAVE_FAILED_NOTICE.to_string())
        );
        assert_eq!(shell.form().draft().monitoring_end_hour, 20);
        assert_eq!(shell.form().saved().monitoring_end_hour, 7);
        shell.shutdown().await;
    }

    #[tokio::test]
    async fn upload_without_file_or_subject_is_rejected() {
        let mut shell = shell(false);
        assert_eq!(
            shell.execute("upload").await,
            Reply::Notice("Please select a file first".to_string())
        );
        assert_eq!(
            shell.execute("upload still.jpg").await,
            Reply::Notice("Please select an elderly before uploading".to_string())
        );
        shell.shutdown().await;
    }

    #[tokio::test]
    async fn select_without_loaded_list_accepts_any_id() {
        let mut shell = shell(false);
        shell.execute("select e9").await;
        assert_eq!(shell.pipeline().selected_subject().as_deref(), Some("e9"));
        let status = match shell.execute("status").await {
            Reply::Output(text) => text,
            other => panic!("unexpected reply {other:?}"),
        };
        assert!(status.contains("subject: e9"));
        assert!(status.contains("session: inactive"));
        shell.execute("select none").await;
        assert_eq!(shell.pipeline().selected_subject(), None);
        shell.shutdown().await;
    }

    #[tokio::test]
    async fn snapshot_without_display_is_reported() {
        let mut shell = shell(false);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("snap.jpg");
        let reply = shell.execute(&format!("snapshot {}", out.display())).await;
        assert_eq!(reply, Reply::Output("no display attached".to_string()));
        shell.shutdown().await;
    }
}
