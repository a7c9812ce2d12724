use crate::LaunchOptions;
use anyhow::{Context, Result};
use plib_core::{
    Align, AttrDef, BrowseMode, Clock, DisplaySurface, Event, Item, ItemId, Key, Mode, Picker,
    ProgramStack, RngState, Session, StatusRecord, StatusStore, SystemClock,
};
use plib_data::{
    load_resolved_config, open_status, save_library_index, JsonStatusFile, Library, STATUS_FILE,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::{info, warn};

const MAX_EVENT_LOG: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct ItemView {
    pub id: ItemId,
    pub path: PathBuf,
    pub summary: String,
}

/// What the modes last asked to show.
#[derive(Debug, Clone)]
pub struct Screen {
    attributes: Vec<AttrDef>,
    files: PathBuf,
    pub title: String,
    pub item: Option<ItemView>,
    pub message: Vec<String>,
    pub align: Align,
}

impl Screen {
    pub fn new(attributes: Vec<AttrDef>, files: PathBuf) -> Self {
        Self {
            attributes,
            files,
            title: String::new(),
            item: None,
            message: Vec::new(),
            align: Align::default(),
        }
    }
}

impl DisplaySurface for Screen {
    fn show_item(&mut self, item: &Item) {
        self.item = Some(ItemView {
            id: item.id,
            path: item.path_in(&self.files),
            summary: item.summary(&self.attributes),
        });
        self.message.clear();
    }

    fn show_message(&mut self, lines: &[String], align: Align) {
        self.message = lines.to_vec();
        self.align = align;
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }
}

pub struct App {
    pub session: Session,
    pub stack: ProgramStack,
    pub screen: Screen,
    status_file: JsonStatusFile,
    saved_record: StatusRecord,
    index_path: PathBuf,
    root: PathBuf,
    pub event_log: VecDeque<String>,
    pub status_line: String,
    pub show_help: bool,
    pub should_quit: bool,
}

impl App {
    pub fn bootstrap(options: &LaunchOptions) -> Result<Self> {
        let dir = &options.dir;
        let config = load_resolved_config(dir)?;
        let library = Library::load(dir)?;
        for key in config.undeclared_attrs(library.collection()) {
            warn!(attr = %key, "library uses an undeclared attribute");
        }
        let index_path = library.index_path().to_path_buf();
        let root = library.root().to_path_buf();
        let files = library.files_dir().to_path_buf();

        let clock = SystemClock;
        let status_file = JsonStatusFile::new(dir.join(STATUS_FILE));
        let status = open_status(&status_file, config.status.clone(), clock.now())?;
        let saved_record = status.record().clone();
        let rng = options
            .seed
            .map(RngState::from_seed)
            .unwrap_or_else(RngState::from_entropy);
        info!(seed = rng.seed(), dir = %dir.display(), "session starting");

        let mut screen = Screen::new(config.attributes.clone(), files);
        let mut session = Session::new(
            Box::new(library.into_collection()),
            status,
            config,
            rng,
            Box::new(clock),
        );
        let checkin = session.check_in();
        let base = Mode::Browse(BrowseMode::new(Picker::all_items()));
        let stack = ProgramStack::new(base, &mut session, &mut screen).context("start browsing")?;
        if let Some(message) = checkin {
            screen.show_message(&[message], Align::Center);
        }

        let status_line = session.status.position_line();
        let mut app = Self {
            session,
            stack,
            screen,
            status_file,
            saved_record,
            index_path,
            root,
            event_log: VecDeque::new(),
            status_line,
            show_help: false,
            should_quit: false,
        };
        app.push_event_line(format!("seed {}", app.session.rng.seed()));
        app.after_dispatch();
        Ok(app)
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn mode_name(&self) -> &'static str {
        self.stack.top().map(Mode::name).unwrap_or("-")
    }

    pub fn handle_key(&mut self, key: Key) {
        if let Err(err) = self
            .stack
            .handle_key(key, &mut self.session, &mut self.screen)
        {
            warn!(error = %err, ?key, "key handling failed");
            self.push_status(err.to_string());
        }
        self.after_dispatch();
    }

    pub fn on_tick(&mut self) {
        match self.stack.poll_timers(&mut self.session, &mut self.screen) {
            Ok(0) => return,
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "timer handling failed");
                self.push_status(err.to_string());
            }
        }
        self.after_dispatch();
    }

    /// Writes the ledger and the library index.
    pub fn save(&self) -> Result<()> {
        self.save_status()?;
        save_library_index(&self.index_path, &self.root, self.session.collection.as_ref())
    }

    pub fn push_status(&mut self, value: impl Into<String>) {
        self.status_line = value.into();
    }

    fn save_status(&self) -> Result<()> {
        self.status_file
            .save(self.session.status.record())
            .with_context(|| format!("save {}", self.status_file.path().display()))
    }

    /// Moves bus events into the log. Any ledger change is written through
    /// at once so a crash cannot lose it.
    fn after_dispatch(&mut self) {
        self.flush_events();
        if self.session.status.record() == &self.saved_record {
            return;
        }
        if let Err(err) = self.save_status() {
            warn!(error = %err, "status not saved");
            self.push_status(format!("status not saved: {err:#}"));
            return;
        }
        self.saved_record = self.session.status.record().clone();
        self.status_line = self.session.status.position_line();
    }

    fn flush_events(&mut self) {
        let drained: Vec<_> = self.session.events.drain().collect();
        for event in drained {
            self.push_event_line(format_event(&event));
        }
    }

    fn push_event_line(&mut self, line: String) {
        if self.event_log.len() >= MAX_EVENT_LOG {
            let _ = self.event_log.pop_front();
        }
        self.event_log.push_back(line);
    }
}

fn format_event(event: &Event) -> String {
    match event {
        Event::ItemShown { id, picker } => format!("shown #{id} from {picker}"),
        Event::PickerChanged { name } => format!("picker {name}"),
        Event::PickerFailed { picker, reason } => format!("picker {picker} failed: {reason}"),
        Event::DeletionMarked { id, marked } => {
            if *marked {
                format!("#{id} marked for deletion")
            } else {
                format!("#{id} unmarked")
            }
        }
        Event::PointsChanged {
            before,
            after,
            reason,
        } => format!("points {before} -> {after} ({reason})"),
        Event::NegotiationStarted {
            your_draws,
            our_draws,
        } => format!("negotiation: you {your_draws}, we up to {our_draws}"),
        Event::NegotiationDraw {
            side,
            value,
            penalty,
        } => {
            if *penalty > 0 {
                format!("{} drew {value}, penalty {penalty}", side.label())
            } else {
                format!("{} drew {value}", side.label())
            }
        }
        Event::PermissionDecided {
            granted,
            confirmed,
            block_minutes,
        } => {
            let verdict = match (granted, confirmed) {
                (true, true) => "permission granted",
                (true, false) => "permission granted, unconfirmed",
                (false, _) => "permission refused",
            };
            match block_minutes {
                Some(minutes) => format!("{verdict}, blocked {minutes} min"),
                None => verdict.to_string(),
            }
        }
        Event::BestOfRound { winner, value } => {
            format!("round to {} for {value}", winner.label())
        }
        Event::BestOfDecided {
            winner,
            margin,
            awarded,
        } => format!(
            "match to {} by {margin}, awarded {awarded}",
            winner.label()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plib_core::Side;
    use std::fs;
    use std::path::Path;

    fn assets_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets")
    }

    fn scratch_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["config.json", "library.json", "status.json"] {
            fs::copy(assets_root().join(name), dir.path().join(name)).expect("copy asset");
        }
        dir
    }

    #[test]
    fn bootstrap_shows_an_item() {
        let dir = scratch_dir();
        let app = App::bootstrap(&LaunchOptions {
            dir: dir.path().to_path_buf(),
            seed: Some(11),
        })
        .expect("bootstrap");
        assert_eq!(app.depth(), 1);
        assert_eq!(app.mode_name(), "browse");
        let shown = app.screen.item.as_ref().expect("item shown");
        assert!(shown.path.starts_with(dir.path().join("pictures")));
        assert!(app.event_log.iter().any(|line| line == "seed 11"));
    }

    #[test]
    fn picker_select_round_trip() {
        let dir = scratch_dir();
        let mut app = App::bootstrap(&LaunchOptions {
            dir: dir.path().to_path_buf(),
            seed: Some(3),
        })
        .expect("bootstrap");
        app.handle_key(Key::Char('p'));
        assert_eq!(app.mode_name(), "picker-select");
        app.handle_key(Key::Esc);
        assert_eq!(app.mode_name(), "browse");
    }

    #[test]
    fn save_writes_both_files() {
        let dir = scratch_dir();
        let mut app = App::bootstrap(&LaunchOptions {
            dir: dir.path().to_path_buf(),
            seed: Some(5),
        })
        .expect("bootstrap");
        app.handle_key(Key::Char('d'));
        app.save().expect("save");
        let index = fs::read_to_string(dir.path().join("library.json")).expect("index");
        assert!(index.contains("\"marked_for_deletion\": true"));
        let library = Library::load(dir.path()).expect("reload");
        let marked = library
            .collection()
            .items()
            .filter(|item| item.marked_for_deletion)
            .count();
        assert_eq!(marked, 1);
    }

    #[test]
    fn ledger_changes_without_events_are_written_through() {
        let dir = scratch_dir();
        let mut app = App::bootstrap(&LaunchOptions {
            dir: dir.path().to_path_buf(),
            seed: Some(13),
        })
        .expect("bootstrap");
        let now = app.session.clock.now();
        app.session.status.give_permission(true, 0, now);
        assert!(app.session.events.drain().next().is_none());
        app.handle_key(Key::Char('z'));
        let stored = JsonStatusFile::new(dir.path().join(STATUS_FILE))
            .load()
            .expect("load status");
        assert_eq!(&stored, app.session.status.record());
        assert!(stored.perm_until > now);
    }

    #[test]
    fn event_lines_read_naturally() {
        assert_eq!(
            format_event(&Event::PointsChanged {
                before: 3,
                after: 1,
                reason: "daily decay".to_string()
            }),
            "points 3 -> 1 (daily decay)"
        );
        assert_eq!(
            format_event(&Event::NegotiationDraw {
                side: Side::Us,
                value: 4,
                penalty: 2
            }),
            "us drew 4, penalty 2"
        );
        assert_eq!(
            format_event(&Event::PermissionDecided {
                granted: false,
                confirmed: false,
                block_minutes: Some(30)
            }),
            "permission refused, blocked 30 min"
        );
    }

    #[test]
    fn event_log_is_capped() {
        let dir = scratch_dir();
        let mut app = App::bootstrap(&LaunchOptions {
            dir: dir.path().to_path_buf(),
            seed: Some(9),
        })
        .expect("bootstrap");
        for _ in 0..(MAX_EVENT_LOG + 20) {
            app.handle_key(Key::Char('n'));
        }
        assert_eq!(app.event_log.len(), MAX_EVENT_LOG);
    }
}
