use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use serde_json::Value;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::bucket::{find_critical, group_records};
use crate::domain::{CMDMode, DaveConfig, DaveError, HELP_TEXT, Message, Record};
use crate::export::{EXPORT_FAILURE_NOTICE, export_csv};
use crate::format::{StatusLevel, format_cell, status_level};
use crate::inputter::{InputResult, Inputter};
use crate::loader::{LoadOutcome, spawn_load};
use crate::schema::ColumnType;
use crate::table::{ColumnFilter, TableView};
use crate::ui::{COLUMN_WIDTH_MARGIN, TABLE_BORDER};

pub const ALERT_MESSAGE: &str = "Critical alert: Issues found in the data!";
const CHART_BARS: usize = 20;
const TREND_POINTS: usize = 10;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Status {
    LOADING,
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    RECORD,
    DISTRIBUTION,
    TREND,
    POPUP,
    CMDINPUT,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CellView {
    pub text: String,
    pub level: Option<StatusLevel>,
}

impl CellView {
    fn plain(text: impl Into<String>) -> Self {
        CellView {
            text: text.into(),
            level: None,
        }
    }

    fn from_value(value: &Value, ctype: ColumnType) -> Self {
        let text = format_cell(value, ctype);
        let level = (ctype == ColumnType::Status && !text.is_empty()).then(|| status_level(&text));
        CellView { text, level }
    }

    fn width(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Clone, Debug)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub ctype: Option<ColumnType>,
    pub data: Vec<CellView>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageInfo {
    pub page: usize,
    pub page_count: usize,
    pub page_size: usize,
    pub nrows: usize,
    pub total_rows: usize,
}

pub struct UIData {
    pub name: String,
    pub tabs: Vec<String>,
    pub selected_tab: usize,
    pub table: Vec<ColumnView>,
    pub selected_row: Option<usize>,
    pub selected_column: usize,
    pub pager: PageInfo,
    pub chart: Vec<(String, u64)>,
    pub trend: Vec<(String, f64)>,
    pub show_popup: bool,
    pub popup_title: String,
    pub popup_message: String,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub search_term: String,
    pub filters: Vec<String>,
    pub status_message: String,
    pub loading: bool,
    pub dark_mode: bool,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            tabs: Vec::new(),
            selected_tab: 0,
            table: Vec::new(),
            selected_row: None,
            selected_column: 0,
            pager: PageInfo::default(),
            chart: Vec::new(),
            trend: Vec::new(),
            show_popup: false,
            popup_title: String::new(),
            popup_message: String::new(),
            cmdinput: InputResult::default(),
            cmd_mode: None,
            active_cmdinput: false,
            search_term: String::new(),
            filters: Vec::new(),
            status_message: String::new(),
            loading: false,
            dark_mode: false,
        }
    }
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub table_width: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize) -> Self {
        let layout = UILayout {
            width: ui_width,
            table_width: ui_width.saturating_sub(TABLE_BORDER),
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

struct RecordView {
    fields: Vec<(String, CellView)>,
    curser_row: usize,
}

impl RecordView {
    fn empty() -> Self {
        RecordView {
            fields: Vec::new(),
            curser_row: 0,
        }
    }
}

struct DistributionView {
    key: String,
    title: String,
    values: Vec<(String, usize)>,
    curser_row: usize,
}

struct TrendView {
    title: String,
    points: Vec<(String, f64)>,
    curser_row: usize,
}

impl TrendView {
    fn empty() -> Self {
        TrendView {
            title: String::new(),
            points: Vec::new(),
            curser_row: 0,
        }
    }
}

impl DistributionView {
    fn empty() -> Self {
        DistributionView {
            key: String::new(),
            title: String::new(),
            values: Vec::new(),
            curser_row: 0,
        }
    }
}

pub struct Model {
    config: DaveConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    tables: Vec<TableView>,
    current_table: usize,
    record_view: RecordView,
    distribution_view: DistributionView,
    trend_view: TrendView,
    uilayout: UILayout,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    search_before_prompt: String,
    status_message: String,
    dark_mode: bool,
    loads: Sender<Message>,
    pending_loads: usize,
}

impl Model {
    pub fn init(config: &DaveConfig, loads: Sender<Message>, ui_width: usize) -> Self {
        let mut model = Self {
            config: config.clone(),
            status: Status::READY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            tables: Vec::new(),
            current_table: 0,
            record_view: RecordView::empty(),
            distribution_view: DistributionView::empty(),
            trend_view: TrendView::empty(),
            uilayout: UILayout::from_values(ui_width),
            uidata: UIData::empty(),
            clipboard: None,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            search_before_prompt: String::new(),
            status_message: "Welcome to Dave Dashboard".to_string(),
            dark_mode: config.dark_mode,
            loads,
            pending_loads: 0,
        };
        model.update_uidata();
        model
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn current(&self) -> Option<&TableView> {
        self.tables.get(self.current_table)
    }

    fn current_mut(&mut self) -> Option<&mut TableView> {
        self.tables.get_mut(self.current_table)
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
    }

    /// The view underneath popups and the command line.
    fn base_modus(&self) -> Modus {
        match self.modus {
            Modus::POPUP | Modus::CMDINPUT => self.previous_modus,
            m => m,
        }
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), DaveError> {
        let Some(msg) = message else {
            return Ok(());
        };

        match msg {
            Message::Loaded(outcome) => {
                self.handle_loaded(outcome);
                return Ok(());
            }
            Message::Resize(width, _) => {
                self.ui_resize(width);
                return Ok(());
            }
            _ => {}
        }

        match self.modus {
            Modus::TABLE => match msg {
                Message::Quit => self.quit(),
                Message::MoveUp => self.with_table(TableView::move_up),
                Message::MoveDown => self.with_table(TableView::move_down),
                Message::MoveLeft => self.move_column(false),
                Message::MoveRight => self.move_column(true),
                Message::NextPage => self.with_table(TableView::next_page),
                Message::PreviousPage => self.with_table(TableView::previous_page),
                Message::FirstPage => self.with_table(|t| t.set_page(0)),
                Message::LastPage => self.with_table(|t| t.set_page(usize::MAX)),
                Message::CyclePageSize => self.cycle_page_size(),
                Message::NextTable => self.switch_table(true),
                Message::PreviousTable => self.switch_table(false),
                Message::Search => self.enter_cmd_mode(CMDMode::SearchTable),
                Message::Filter => self.enter_cmd_mode(CMDMode::FilterByColumn),
                Message::FilterByCell => self.filter_by_cell(),
                Message::SortAscending => self.sort_current_column(true),
                Message::SortDescending => self.sort_current_column(false),
                Message::Enter => self.enter(),
                Message::Exit => self.exit(),
                Message::Distribution => self.build_distribution_view(),
                Message::Trend => self.build_trend_view(),
                Message::Export => self.export(false),
                Message::ExportAll => self.export(true),
                Message::Refresh => self.refresh(),
                Message::ToggleTheme => self.toggle_theme(),
                Message::CopyCell => self.copy_table_cell(),
                Message::Help => self.show_popup("Help", HELP_TEXT),
                _ => (),
            },
            Modus::RECORD => match msg {
                Message::Quit => self.quit(),
                Message::MoveUp => self.move_record_selection(false),
                Message::MoveDown => self.move_record_selection(true),
                Message::MoveLeft => self.step_record(false),
                Message::MoveRight => self.step_record(true),
                Message::CopyCell => self.copy_record_cell(),
                Message::ToggleTheme => self.toggle_theme(),
                Message::Help => self.show_popup("Help", HELP_TEXT),
                Message::Exit | Message::Enter => self.exit(),
                _ => (),
            },
            Modus::DISTRIBUTION => match msg {
                Message::Quit => self.quit(),
                Message::MoveUp => self.move_distribution_selection(false),
                Message::MoveDown => self.move_distribution_selection(true),
                Message::ToggleTheme => self.toggle_theme(),
                Message::Help => self.show_popup("Help", HELP_TEXT),
                Message::Enter => self.enter(),
                Message::Exit => self.exit(),
                _ => (),
            },
            Modus::TREND => match msg {
                Message::Quit => self.quit(),
                Message::MoveUp => self.move_trend_selection(false),
                Message::MoveDown => self.move_trend_selection(true),
                Message::ToggleTheme => self.toggle_theme(),
                Message::Help => self.show_popup("Help", HELP_TEXT),
                Message::Exit | Message::Enter => self.exit(),
                _ => (),
            },
            Modus::POPUP => match msg {
                Message::Quit => self.quit(),
                Message::Exit | Message::Enter | Message::Help => self.exit(),
                _ => (),
            },
            Modus::CMDINPUT => {
                if let Message::RawKey(key) = msg {
                    self.raw_input(key)
                }
            }
        }

        self.update_uidata();
        Ok(())
    }

    // -------------------- Data loading ---------------------- //

    fn refresh(&mut self) {
        info!("Refreshing data from {} endpoint(s)", self.config.endpoints.len());
        self.pending_loads += 1;
        self.status = Status::LOADING;
        self.set_status_message("Loading ...");
        spawn_load(self.config.clone(), self.loads.clone());
    }

    fn handle_loaded(&mut self, outcome: LoadOutcome) {
        let start_time = Instant::now();
        self.pending_loads = self.pending_loads.saturating_sub(1);
        if self.pending_loads == 0 && self.status == Status::LOADING {
            self.status = Status::READY;
        }

        let selected = self.current().map(|t| t.name().to_string());
        let page_size = self
            .current()
            .map(|t| t.page_size())
            .unwrap_or(self.config.page_size);
        let nrecords = outcome.records.len();

        let buckets = group_records(
            outcome.records,
            &self.config.discriminator,
            &self.config.hidden_fields,
        );
        let findings = find_critical(&buckets);
        self.tables = buckets
            .into_iter()
            .map(|b| TableView::new(Arc::new(b), page_size))
            .collect();
        self.current_table = selected
            .and_then(|name| self.tables.iter().position(|t| t.name() == name))
            .unwrap_or(0);

        // Detail views point into the old data
        if matches!(self.base_modus(), Modus::RECORD | Modus::DISTRIBUTION | Modus::TREND) {
            if self.modus == self.base_modus() {
                self.modus = Modus::TABLE;
            }
            self.previous_modus = Modus::TABLE;
        }

        let message = outcome.notice.unwrap_or_else(|| {
            format!(
                "Loaded {nrecords} records into {} tables in {}ms",
                self.tables.len(),
                start_time.elapsed().as_millis()
            )
        });
        self.set_status_message(message);

        if !findings.is_empty() {
            warn!("{} critical values found", findings.len());
            for f in findings.iter() {
                debug!("Critical: {}.{} = {}", f.table, f.field, f.value);
            }
            if self.modus == Modus::CMDINPUT {
                self.set_status_message(ALERT_MESSAGE);
            } else {
                let details = findings
                    .iter()
                    .take(10)
                    .map(|f| format!("{}: {} = {}", f.table, f.field, f.value))
                    .collect::<Vec<String>>()
                    .join("\n");
                self.show_popup("Alert", &format!("{ALERT_MESSAGE}\n\n{details}"));
            }
        }
        self.update_uidata();
    }

    // -------------------- Table handling ---------------------- //

    fn with_table(&mut self, f: impl FnOnce(&mut TableView)) {
        if let Some(table) = self.current_mut() {
            f(table);
        }
    }

    fn switch_table(&mut self, forward: bool) {
        let n = self.tables.len();
        if n == 0 {
            return;
        }
        self.current_table = if forward {
            (self.current_table + 1) % n
        } else {
            (self.current_table + n - 1) % n
        };
        trace!("Switched to table {}", self.current_table);
    }

    fn move_column(&mut self, right: bool) {
        if let Some(table) = self.current_mut() {
            let ncolumns = table.schema().len();
            if right {
                if table.curser_column + 1 < ncolumns {
                    table.curser_column += 1;
                }
            } else {
                table.curser_column = table.curser_column.saturating_sub(1);
            }
        }
    }

    fn cycle_page_size(&mut self) {
        if let Some(table) = self.current_mut() {
            let size = table.cycle_page_size();
            self.set_status_message(format!("{size} rows per page"));
        }
    }

    fn sort_current_column(&mut self, ascending: bool) {
        let Some(table) = self.current_mut() else {
            return;
        };
        let Some(key) = table.selected_key().map(str::to_string) else {
            return;
        };
        table.sort(&key, ascending);
        let direction = if ascending { "ascending" } else { "descending" };
        self.set_status_message(format!("Sorted by {key} ({direction})"));
    }

    fn filter_by_cell(&mut self) {
        let Some(table) = self.current_mut() else {
            return;
        };
        let (Some(key), Some(value)) = (table.selected_key().map(str::to_string), table.selected_filter_value()) else {
            return;
        };
        table.filter_column(&key, &value);
        let nrows = table.nrows();
        self.set_status_message(format!("Filter {key} = {value}: {nrows} rows"));
    }

    fn copy_table_cell(&mut self) {
        if let Some(cell) = self.current().and_then(|t| t.selected_cell()) {
            self.copy_to_clipboard(cell);
        }
    }

    fn copy_to_clipboard(&mut self, text: String) {
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    warn!("Clipboard unavailable: {e:?}");
                    self.set_status_message("Clipboard unavailable");
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(text) {
                Ok(_) => {
                    trace!("Copied cell content to clipboard.");
                    self.set_status_message("Copied to clipboard");
                }
                Err(e) => {
                    warn!("Error copying to clipboard: {e:?}");
                    self.set_status_message("Copy failed");
                }
            }
        }
    }

    fn export(&mut self, all: bool) {
        let Some(table) = self.current() else {
            self.set_status_message("Nothing to export");
            return;
        };
        let count = if all { table.total_rows() } else { table.nrows() };
        if count == 0 {
            self.set_status_message("No rows to export");
            return;
        }
        let dir = self.config.export_dir.clone();
        let result = if all {
            export_csv(table.name(), table.schema(), table.all_records(), &dir)
        } else {
            export_csv(table.name(), table.schema(), table.filtered_records(), &dir)
        };
        match result {
            Ok(path) => self.set_status_message(format!("Exported {count} rows to {}", path.display())),
            Err(e) => {
                error!("Error exporting CSV: {e}");
                self.set_status_message(EXPORT_FAILURE_NOTICE);
            }
        }
    }

    fn toggle_theme(&mut self) {
        self.dark_mode = !self.dark_mode;
        let mode = if self.dark_mode { "Dark" } else { "Light" };
        self.set_status_message(format!("{mode} mode"));
    }

    // -------------------- Record view ---------------------- //

    fn build_record_view(&mut self) {
        let Some(table) = self.current() else {
            return;
        };
        let Some(record) = table.selected_record() else {
            return;
        };
        let fields = record_fields(record, table);
        let record_view = &mut self.record_view;
        record_view.fields = fields;
        record_view.curser_row = std::cmp::min(
            record_view.curser_row,
            record_view.fields.len().saturating_sub(1),
        );
    }

    fn move_record_selection(&mut self, down: bool) {
        let record = &mut self.record_view;
        if down {
            if record.curser_row + 1 < record.fields.len() {
                record.curser_row += 1;
            }
        } else {
            record.curser_row = record.curser_row.saturating_sub(1);
        }
    }

    fn step_record(&mut self, forward: bool) {
        self.with_table(|t| if forward { t.move_down() } else { t.move_up() });
        self.build_record_view();
    }

    fn copy_record_cell(&mut self) {
        let record = &self.record_view;
        if let Some((_, cell)) = record.fields.get(record.curser_row) {
            let text = cell.text.clone();
            self.copy_to_clipboard(text);
        }
    }

    // -------------------- Distribution view ---------------------- //

    fn build_distribution_view(&mut self) {
        let Some(table) = self.current() else {
            return;
        };
        let Some(key) = table.selected_key().map(str::to_string) else {
            return;
        };
        let title = table
            .schema()
            .column(&key)
            .map(|c| c.title.clone())
            .unwrap_or_else(|| key.clone());
        trace!("Calculate distribution for column {key}");
        let values = table.distribution(&key);

        let hist = &mut self.distribution_view;
        hist.key = key;
        hist.title = title;
        hist.values = values;
        hist.curser_row = 0;
        self.modus = Modus::DISTRIBUTION;
        self.previous_modus = Modus::TABLE;
    }

    fn move_distribution_selection(&mut self, down: bool) {
        let hist = &mut self.distribution_view;
        if down {
            if hist.curser_row + 1 < hist.values.len() {
                hist.curser_row += 1;
            }
        } else {
            hist.curser_row = hist.curser_row.saturating_sub(1);
        }
    }

    // -------------------- Trend view ---------------------- //

    fn build_trend_view(&mut self) {
        let Some(table) = self.current() else {
            return;
        };
        let Some(spec) = table.selected_key().and_then(|k| table.schema().column(k)) else {
            return;
        };
        let title = spec.title.clone();
        let points = table.numeric_series(&spec.key, TREND_POINTS);
        if points.is_empty() {
            self.set_status_message(format!("{title} has no numeric values"));
            return;
        }
        trace!("Trend of {title} over {} rows", points.len());

        let trend = &mut self.trend_view;
        trend.title = title;
        trend.points = points;
        trend.curser_row = 0;
        self.modus = Modus::TREND;
        self.previous_modus = Modus::TABLE;
    }

    fn move_trend_selection(&mut self, down: bool) {
        let trend = &mut self.trend_view;
        if down {
            if trend.curser_row + 1 < trend.points.len() {
                trend.curser_row += 1;
            }
        } else {
            trend.curser_row = trend.curser_row.saturating_sub(1);
        }
    }

    // -------------------- Control handling functions ---------------------- //

    fn enter(&mut self) {
        match self.modus {
            Modus::TABLE => {
                if self.current().and_then(|t| t.selected_record()).is_some() {
                    self.record_view.curser_row = 0;
                    self.build_record_view();
                    self.modus = Modus::RECORD;
                    self.previous_modus = Modus::TABLE;
                }
            }
            Modus::DISTRIBUTION => {
                let hist = &self.distribution_view;
                if let Some((value, _)) = hist.values.get(hist.curser_row) {
                    let (key, value) = (hist.key.clone(), value.clone());
                    self.with_table(|t| t.filter_column(&key, &value));
                    self.set_status_message(format!("Filter {key} = {value}"));
                }
                self.modus = Modus::TABLE;
                self.previous_modus = Modus::DISTRIBUTION;
            }
            Modus::RECORD | Modus::TREND | Modus::POPUP | Modus::CMDINPUT => {}
        }
    }

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE => {
                let Some(table) = self.current_mut() else {
                    return;
                };
                if table.pop_filter() {
                    let nrows = table.nrows();
                    self.set_status_message(format!("Removed filter: {nrows} rows"));
                } else if !table.search_term().is_empty() {
                    table.search("");
                    self.set_status_message("Search cleared");
                }
            }
            Modus::RECORD | Modus::DISTRIBUTION | Modus::TREND => {
                self.previous_modus = self.modus;
                self.modus = Modus::TABLE;
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
                self.uidata.show_popup = false;
            }
            Modus::CMDINPUT => {}
        }
    }

    fn show_popup(&mut self, title: &str, message: &str) {
        if self.modus != Modus::POPUP {
            self.previous_modus = self.modus;
        }
        self.modus = Modus::POPUP;
        self.uidata.popup_title = title.to_string();
        self.uidata.popup_message = message.to_string();
        self.uidata.show_popup = true;
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        if self.current().is_none() {
            return;
        }
        trace!("Entering command mode {mode:?}");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;

        let prefill = match mode {
            CMDMode::SearchTable => self.current().map(|t| t.search_term().to_string()),
            CMDMode::FilterByColumn => None,
        }
        .unwrap_or_default();
        self.search_before_prompt = prefill.clone();
        self.input.start(&prefill);
        self.last_input = self.input.get();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        if !self.active_cmdinput {
            return;
        }
        self.last_input = self.input.read(key);
        let input = self.last_input.clone();

        // Searching is live, every edit re-filters and jumps back to the first page
        if self.cmd_mode == Some(CMDMode::SearchTable) && input.changed && !input.canceled {
            self.with_table(|t| t.search(&input.input));
        }
        if input.finished {
            self.handle_cmd_input(input);
        }
    }

    fn handle_cmd_input(&mut self, input: InputResult) {
        trace!("Handle cmd input {}", input.input);
        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        match self.cmd_mode {
            Some(CMDMode::SearchTable) => {
                if input.canceled {
                    let previous = self.search_before_prompt.clone();
                    self.with_table(|t| t.search(&previous));
                } else if let Some(table) = self.current() {
                    let message = format!("Found {} of {} rows", table.nrows(), table.total_rows());
                    self.set_status_message(message);
                }
            }
            Some(CMDMode::FilterByColumn) => {
                if !input.canceled && !input.input.is_empty() {
                    if let Some(table) = self.current_mut() {
                        if let Some(key) = table.selected_key().map(str::to_string) {
                            table.push_filter(ColumnFilter::Contains {
                                key,
                                term: input.input.clone(),
                            });
                            let nrows = table.nrows();
                            self.set_status_message(format!("Filter matched {nrows} rows"));
                        }
                    }
                }
            }
            None => info!("Cmd mode is none!"),
        }
        self.cmd_mode = None;
    }

    fn ui_resize(&mut self, width: usize) {
        trace!("UI was resized! w:{}->{}", self.uilayout.width, width);
        self.uilayout = UILayout::from_values(width);
        self.update_uidata();
    }

    // -------------------- UI data ---------------------- //

    fn update_uidata(&mut self) {
        let (name, table, selected_row, selected_column, chart) = match self.base_modus() {
            Modus::RECORD => self.record_columns(),
            Modus::DISTRIBUTION => self.distribution_columns(),
            Modus::TREND => self.trend_columns(),
            _ => self.table_columns(),
        };
        let trend = if self.base_modus() == Modus::TREND {
            self.trend_view.points.clone()
        } else {
            Vec::new()
        };

        let current = self.current();
        let pager = current
            .map(|t| PageInfo {
                page: t.page(),
                page_count: t.page_count(),
                page_size: t.page_size(),
                nrows: t.nrows(),
                total_rows: t.total_rows(),
            })
            .unwrap_or_default();
        let search_term = current.map(|t| t.search_term().to_string()).unwrap_or_default();
        let filters = current
            .map(|t| t.filters().iter().map(ColumnFilter::label).collect())
            .unwrap_or_default();
        let tabs = self.tables.iter().map(|t| t.name().to_string()).collect();

        let uidata = &mut self.uidata;
        uidata.name = name;
        uidata.tabs = tabs;
        uidata.selected_tab = self.current_table;
        uidata.table = table;
        uidata.selected_row = selected_row;
        uidata.selected_column = selected_column;
        uidata.chart = chart;
        uidata.trend = trend;
        uidata.pager = pager;
        uidata.search_term = search_term;
        uidata.filters = filters;
        uidata.show_popup = self.modus == Modus::POPUP;
        uidata.cmdinput = self.last_input.clone();
        uidata.cmd_mode = self.cmd_mode;
        uidata.active_cmdinput = self.active_cmdinput;
        uidata.status_message = self.status_message.clone();
        uidata.loading = self.status == Status::LOADING;
        uidata.dark_mode = self.dark_mode;
    }

    fn table_columns(&mut self) -> (String, Vec<ColumnView>, Option<usize>, usize, Vec<(String, u64)>) {
        let max_column_width = self.config.max_column_width;
        let budget = self.uilayout.table_width;
        let Some(table) = self.tables.get_mut(self.current_table) else {
            return (String::new(), Vec::new(), None, 0, Vec::new());
        };

        let sort = table.sort_state().map(|(k, asc)| (k.to_string(), asc));
        let page: Vec<&Record> = table.page_records().collect();
        let columns: Vec<ColumnView> = table
            .schema()
            .columns
            .iter()
            .map(|spec| {
                let mut name = spec.title.clone();
                if let Some((key, asc)) = &sort {
                    if *key == spec.key {
                        name.push_str(if *asc { " ▲" } else { " ▼" });
                    }
                }
                let data: Vec<CellView> = page
                    .iter()
                    .map(|r| CellView::from_value(r.get(&spec.key).unwrap_or(&Value::Null), spec.ctype))
                    .collect();
                let content = data.iter().map(CellView::width).max().unwrap_or(0);
                let width = std::cmp::min(
                    std::cmp::max(name.chars().count(), content) + COLUMN_WIDTH_MARGIN,
                    max_column_width,
                );
                ColumnView {
                    name,
                    width,
                    ctype: Some(spec.ctype),
                    data,
                }
            })
            .collect();
        let selected_row = (!page.is_empty()).then_some(table.curser_row);

        // Keep the column curser on screen
        if table.curser_column < table.offset_column {
            table.offset_column = table.curser_column;
        }
        let widths: Vec<usize> = columns.iter().map(|c| c.width).collect();
        while table.offset_column < table.curser_column
            && !fit_columns(&widths, table.offset_column, budget)
                .iter()
                .any(|&(idx, w)| idx == table.curser_column && w == widths[idx])
        {
            table.offset_column += 1;
        }

        let visible: Vec<ColumnView> = fit_columns(&widths, table.offset_column, budget)
            .into_iter()
            .map(|(idx, width)| ColumnView {
                width,
                ..columns[idx].clone()
            })
            .collect();
        let selected_column = table.curser_column.saturating_sub(table.offset_column);
        (table.name().to_string(), visible, selected_row, selected_column, Vec::new())
    }

    fn record_columns(&self) -> (String, Vec<ColumnView>, Option<usize>, usize, Vec<(String, u64)>) {
        let record = &self.record_view;
        let header_width = record
            .fields
            .iter()
            .map(|(title, _)| title.chars().count())
            .max()
            .unwrap_or(0)
            + COLUMN_WIDTH_MARGIN;
        let headers = ColumnView {
            name: "Field".to_string(),
            width: header_width,
            ctype: None,
            data: record.fields.iter().map(|(t, _)| CellView::plain(t.clone())).collect(),
        };
        let values = ColumnView {
            name: "Value".to_string(),
            width: self.uilayout.table_width.saturating_sub(header_width + 1),
            ctype: None,
            data: record.fields.iter().map(|(_, c)| c.clone()).collect(),
        };
        let name = format!(
            "R[{}] {}",
            self.current().map(|t| t.name()).unwrap_or_default(),
            self.current().map(|t| t.selected_position() + 1).unwrap_or(0)
        );
        let selected = (!record.fields.is_empty()).then_some(record.curser_row);
        (name, vec![headers, values], selected, 1, Vec::new())
    }

    fn distribution_columns(&self) -> (String, Vec<ColumnView>, Option<usize>, usize, Vec<(String, u64)>) {
        let hist = &self.distribution_view;
        let total: usize = hist.values.iter().map(|(_, c)| c).sum();
        let counts: Vec<CellView> = hist
            .values
            .iter()
            .map(|(_, c)| CellView::plain(format!("{:.0}% {}", *c as f64 * 100.0 / total.max(1) as f64, c)))
            .collect();
        let count_width = counts.iter().map(CellView::width).max().unwrap_or(0).max(6) + COLUMN_WIDTH_MARGIN;
        let values = ColumnView {
            name: hist.title.clone(),
            // The chart takes the right half of the table area
            width: (self.uilayout.width / 2)
                .saturating_sub(TABLE_BORDER + count_width + 1),
            ctype: None,
            data: hist.values.iter().map(|(v, _)| CellView::plain(v.clone())).collect(),
        };
        let counts = ColumnView {
            name: "Counts".to_string(),
            width: count_width,
            ctype: None,
            data: counts,
        };
        let chart = hist
            .values
            .iter()
            .take(CHART_BARS)
            .map(|(v, c)| (v.clone(), *c as u64))
            .collect();
        let name = format!(
            "H[{}] {}",
            self.current().map(|t| t.name()).unwrap_or_default(),
            hist.title
        );
        let selected = (!hist.values.is_empty()).then_some(hist.curser_row);
        (name, vec![counts, values], selected, 1, chart)
    }

    fn trend_columns(&self) -> (String, Vec<ColumnView>, Option<usize>, usize, Vec<(String, u64)>) {
        let trend = &self.trend_view;
        let labels: Vec<CellView> = trend.points.iter().map(|(l, _)| CellView::plain(l.clone())).collect();
        let values: Vec<CellView> = trend
            .points
            .iter()
            .map(|(_, v)| CellView::from_value(&serde_json::json!(v), ColumnType::Number))
            .collect();
        let value_width = values
            .iter()
            .map(CellView::width)
            .max()
            .unwrap_or(0)
            .max(trend.title.chars().count())
            + COLUMN_WIDTH_MARGIN;
        let label_width = (self.uilayout.width / 2).saturating_sub(TABLE_BORDER + value_width + 1);
        let name = format!(
            "L[{}] {}",
            self.current().map(|t| t.name()).unwrap_or_default(),
            trend.title
        );
        let columns = vec![
            ColumnView {
                name: "Row".to_string(),
                width: label_width,
                ctype: None,
                data: labels,
            },
            ColumnView {
                name: trend.title.clone(),
                width: value_width,
                ctype: Some(ColumnType::Number),
                data: values,
            },
        ];
        let selected = (!trend.points.is_empty()).then_some(trend.curser_row);
        (name, columns, selected, 1, Vec::new())
    }
}

fn record_fields(record: &Record, table: &TableView) -> Vec<(String, CellView)> {
    table
        .schema()
        .columns
        .iter()
        .map(|spec| {
            let value = record.get(&spec.key).unwrap_or(&Value::Null);
            (spec.title.clone(), CellView::from_value(value, spec.ctype))
        })
        .collect()
}

/// Columns starting at `offset` that fit into `budget`, as (index, render width).
/// The last column is cut to the remaining width if it only fits partially.
fn fit_columns(widths: &[usize], offset: usize, budget: usize) -> Vec<(usize, usize)> {
    let mut visible = Vec::new();
    let mut used = 0;
    for (idx, &width) in widths.iter().enumerate().skip(offset) {
        if used + width <= budget {
            visible.push((idx, width));
            used += width + 1;
        } else {
            if used < budget {
                visible.push((idx, budget - used));
            }
            break;
        }
    }
    visible
}
