use ratatui::{
    Frame,
    layout::{Constraint, Direction, Flex, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, BarChart, Block, Cell, Chart, Clear, Dataset, GraphType, Paragraph, Row, Table, TableState, Tabs, Wrap,
    },
};

use crate::domain::CMDMode;
use crate::format::StatusLevel;
use crate::model::{ColumnView, UIData};
use crate::schema::ColumnType;

pub const HEADER_HEIGHT: usize = 2;
pub const PAGER_HEIGHT: usize = 1;
pub const CMDLINE_HEIGHT: usize = 1;
pub const TABLE_BORDER: usize = 2;
pub const COLUMN_WIDTH_MARGIN: usize = 1;

const BRAND_GREEN: Color = Color::Rgb(3, 102, 73);

struct Theme {
    fg: Color,
    bg: Color,
    muted: Color,
    header_fg: Color,
    header_bg: Color,
    zebra_bg: Color,
    highlight: Color,
}

impl Theme {
    fn light() -> Self {
        Theme {
            fg: Color::Black,
            bg: Color::White,
            muted: Color::DarkGray,
            header_fg: Color::White,
            header_bg: BRAND_GREEN,
            zebra_bg: Color::Rgb(240, 244, 242),
            highlight: Color::Rgb(204, 229, 219),
        }
    }

    fn dark() -> Self {
        Theme {
            fg: Color::Gray,
            bg: Color::Rgb(24, 26, 27),
            muted: Color::DarkGray,
            header_fg: Color::White,
            header_bg: BRAND_GREEN,
            zebra_bg: Color::Rgb(36, 39, 41),
            highlight: Color::Rgb(20, 70, 55),
        }
    }

    fn status(&self, level: StatusLevel) -> Style {
        match level {
            StatusLevel::Error => Style::new().fg(Color::Red).add_modifier(Modifier::BOLD),
            StatusLevel::Warning => Style::new().fg(Color::Yellow),
            StatusLevel::Success => Style::new().fg(Color::Green),
            StatusLevel::Neutral => Style::new().fg(self.fg),
        }
    }
}

#[derive(Default)]
pub struct DashboardUI {
    table_state: TableState,
}

impl DashboardUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, uidata: &UIData, frame: &mut Frame) {
        let theme = if uidata.dark_mode { Theme::dark() } else { Theme::light() };
        let area = frame.area();
        frame.render_widget(Block::new().style(Style::new().fg(theme.fg).bg(theme.bg)), area);

        let [title_area, tabs_area, table_area, pager_area, cmdline_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length((HEADER_HEIGHT - 1) as u16),
            Constraint::Min(0),
            Constraint::Length(PAGER_HEIGHT as u16),
            Constraint::Length(CMDLINE_HEIGHT as u16),
        ])
        .areas(area);

        self.draw_title(uidata, &theme, frame, title_area);
        self.draw_tabs(uidata, &theme, frame, tabs_area);

        if uidata.chart.is_empty() && uidata.trend.is_empty() {
            self.draw_table(uidata, &theme, frame, table_area);
        } else {
            let [left, right] = Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)])
                .areas(table_area);
            self.draw_table(uidata, &theme, frame, left);
            if uidata.trend.is_empty() {
                self.draw_chart(uidata, &theme, frame, right);
            } else {
                self.draw_trend(uidata, &theme, frame, right);
            }
        }

        self.draw_pager(uidata, &theme, frame, pager_area);
        self.draw_cmdline(uidata, &theme, frame, cmdline_area);

        if uidata.show_popup {
            self.draw_popup(uidata, &theme, frame, area);
        }
    }

    fn draw_title(&self, uidata: &UIData, theme: &Theme, frame: &mut Frame, area: Rect) {
        let style = Style::new().fg(theme.header_fg).bg(theme.header_bg);
        let title = Line::from(" Dave - Dashboard ".bold()).style(style);
        let mut indicators = Vec::new();
        if uidata.loading {
            indicators.push(Span::raw("Loading... "));
        }
        indicators.push(Span::raw(if uidata.dark_mode { "[dark] " } else { "[light] " }));
        frame.render_widget(Paragraph::new(title).style(style), area);
        frame.render_widget(Line::from(indicators).style(style).right_aligned(), area);
    }

    fn draw_tabs(&self, uidata: &UIData, theme: &Theme, frame: &mut Frame, area: Rect) {
        if uidata.tabs.is_empty() {
            let text = if uidata.loading { "Loading ..." } else { "No data" };
            frame.render_widget(Line::from(text).fg(theme.muted), area);
            return;
        }
        let tabs = Tabs::new(uidata.tabs.iter().map(|t| t.as_str()))
            .select(uidata.selected_tab)
            .style(Style::new().fg(theme.muted))
            .highlight_style(Style::new().fg(BRAND_GREEN).add_modifier(Modifier::BOLD | Modifier::UNDERLINED))
            .divider("|");
        frame.render_widget(tabs, area);
    }

    fn draw_table(&mut self, uidata: &UIData, theme: &Theme, frame: &mut Frame, area: Rect) {
        let mut title = vec![Span::from(format!(" {} ", uidata.name)).bold()];
        if !uidata.search_term.is_empty() {
            title.push(Span::from(format!("/{} ", uidata.search_term)).fg(theme.muted));
        }
        for filter in uidata.filters.iter() {
            title.push(Span::from(format!("[{filter}] ")).fg(theme.muted));
        }
        let block = Block::bordered()
            .title(Line::from(title))
            .border_style(Style::new().fg(BRAND_GREEN));

        let nrows = uidata.table.first().map(|c| c.data.len()).unwrap_or(0);
        if nrows == 0 {
            let message = if uidata.tabs.is_empty() { "" } else { "No matching rows" };
            frame.render_widget(
                Paragraph::new(message).centered().fg(theme.muted).block(block),
                area,
            );
            return;
        }

        let header = Row::new(uidata.table.iter().map(|c| Cell::from(c.name.as_str())))
            .style(Style::new().fg(theme.header_fg).bg(theme.header_bg).add_modifier(Modifier::BOLD));
        let rows: Vec<Row> = (0..nrows)
            .map(|row_index| {
                let cells = uidata.table.iter().map(|column| data_cell(column, row_index, theme));
                let row_style = if row_index % 2 == 1 {
                    Style::new().bg(theme.zebra_bg)
                } else {
                    Style::default()
                };
                Row::new(cells).style(row_style)
            })
            .collect();
        let widths = uidata
            .table
            .iter()
            .map(|c| Constraint::Length(c.width as u16));

        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(1)
            .block(block)
            .row_highlight_style(Style::new().bg(theme.highlight))
            .cell_highlight_style(Style::new().add_modifier(Modifier::REVERSED));

        self.table_state.select(uidata.selected_row);
        self.table_state.select_column(Some(uidata.selected_column));
        frame.render_stateful_widget(table, area, &mut self.table_state);
    }

    fn draw_chart(&self, uidata: &UIData, theme: &Theme, frame: &mut Frame, area: Rect) {
        let bars: Vec<(&str, u64)> = uidata.chart.iter().map(|(l, c)| (l.as_str(), *c)).collect();
        let chart = BarChart::default()
            .block(Block::bordered().title(" Distribution ").border_style(Style::new().fg(BRAND_GREEN)))
            .direction(Direction::Horizontal)
            .data(bars.as_slice())
            .bar_width(1)
            .bar_gap(0)
            .bar_style(Style::new().fg(BRAND_GREEN))
            .value_style(Style::new().fg(theme.header_fg).bg(BRAND_GREEN))
            .label_style(Style::new().fg(theme.fg));
        frame.render_widget(chart, area);
    }

    fn draw_trend(&self, uidata: &UIData, theme: &Theme, frame: &mut Frame, area: Rect) {
        let points: Vec<(f64, f64)> = uidata
            .trend
            .iter()
            .enumerate()
            .map(|(i, (_, v))| (i as f64, *v))
            .collect();
        let (min, max) = points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, v)| (lo.min(*v), hi.max(*v)));
        // Flat series still need a visible band
        let (min, max) = if max > min { (min, max) } else { (min - 1.0, max + 1.0) };
        let last = points.len().saturating_sub(1) as f64;

        let title = uidata.table.get(1).map(|c| c.name.as_str()).unwrap_or_default();
        let first_label = uidata.trend.first().map(|(l, _)| l.as_str()).unwrap_or_default();
        let last_label = uidata.trend.last().map(|(l, _)| l.as_str()).unwrap_or_default();

        let dataset = Dataset::default()
            .name(title)
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::new().fg(BRAND_GREEN))
            .data(&points);
        let chart = Chart::new(vec![dataset])
            .block(Block::bordered().title(" Trend ").border_style(Style::new().fg(BRAND_GREEN)))
            .style(Style::new().fg(theme.fg))
            .x_axis(
                Axis::default()
                    .style(Style::new().fg(theme.muted))
                    .bounds([0.0, last.max(1.0)])
                    .labels([first_label.to_string(), last_label.to_string()]),
            )
            .y_axis(
                Axis::default()
                    .style(Style::new().fg(theme.muted))
                    .bounds([min, max])
                    .labels([format!("{min:.1}"), format!("{max:.1}")]),
            );
        frame.render_widget(chart, area);
    }

    fn draw_pager(&self, uidata: &UIData, theme: &Theme, frame: &mut Frame, area: Rect) {
        let pager = &uidata.pager;
        let rows = if pager.nrows == pager.total_rows {
            format!("{} rows", pager.nrows)
        } else {
            format!("{} of {} rows", pager.nrows, pager.total_rows)
        };
        let line = Line::from(vec![
            Span::from(format!(" Page {} of {} ", pager.page + 1, pager.page_count.max(1))).bold(),
            Span::from(format!("| {} per page | {rows} ", pager.page_size)),
            Span::from("| ? help").fg(theme.muted),
        ]);
        frame.render_widget(line, area);
    }

    fn draw_cmdline(&self, uidata: &UIData, theme: &Theme, frame: &mut Frame, area: Rect) {
        if !uidata.active_cmdinput {
            frame.render_widget(Line::from(uidata.status_message.as_str()).fg(theme.muted), area);
            return;
        }

        let prompt = match uidata.cmd_mode {
            Some(CMDMode::FilterByColumn) => {
                let column = uidata
                    .table
                    .get(uidata.selected_column)
                    .map(|c| c.name.as_str())
                    .unwrap_or_default();
                format!("Filter {column}: ")
            }
            _ => "Search: ".to_string(),
        };
        let input = &uidata.cmdinput;
        let x = area.x as usize + prompt.chars().count() + input.curser_pos;
        frame.render_widget(
            Line::from(vec![Span::from(prompt).bold(), Span::from(input.input.as_str())]),
            area,
        );
        frame.set_cursor_position(Position::new(
            std::cmp::min(x, (area.x + area.width).saturating_sub(1) as usize) as u16,
            area.y,
        ));
    }

    fn draw_popup(&self, uidata: &UIData, theme: &Theme, frame: &mut Frame, area: Rect) {
        let [area] = Layout::horizontal([Constraint::Percentage(60)])
            .flex(Flex::Center)
            .areas(area);
        let [area] = Layout::vertical([Constraint::Percentage(60)])
            .flex(Flex::Center)
            .areas(area);

        let border = if uidata.popup_title == "Alert" { Color::Red } else { BRAND_GREEN };
        let block = Block::bordered()
            .title(Line::from(format!(" {} ", uidata.popup_title)).bold())
            .title_bottom(Line::from(" Esc to close ").right_aligned())
            .border_style(Style::new().fg(border))
            .style(Style::new().fg(theme.fg).bg(theme.bg));
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(uidata.popup_message.as_str())
                .wrap(Wrap { trim: false })
                .block(block),
            area,
        );
    }
}

fn data_cell<'a>(column: &'a ColumnView, row_index: usize, theme: &Theme) -> Cell<'a> {
    match column.data.get(row_index) {
        Some(cell) => {
            let style = cell.level.map(|l| theme.status(l)).unwrap_or_default();
            let line = Line::from(cell.text.as_str());
            let line = if column.ctype == Some(ColumnType::Number) {
                line.right_aligned()
            } else {
                line
            };
            Cell::from(line).style(style)
        }
        None => Cell::from(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DaveConfig, Message};
    use crate::loader::{LoadOutcome, sample_records};
    use crate::model::Model;
    use ratatui::{Terminal, backend::TestBackend};
    use std::sync::mpsc;

    fn render(model: &Model, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        let mut ui = DashboardUI::new();
        terminal.draw(|f| ui.draw(model.get_uidata(), f)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    fn loaded_model() -> Model {
        let (tx, _rx) = mpsc::channel();
        let mut model = Model::init(&DaveConfig::default(), tx, 100);
        model
            .update(Some(Message::Loaded(LoadOutcome {
                records: sample_records(),
                notice: None,
                used_fallback: false,
            })))
            .unwrap();
        model
    }

    #[test]
    fn renders_title_tabs_and_rows() {
        let screen = render(&loaded_model(), 100, 30);
        assert!(screen.contains("Dave - Dashboard"));
        assert!(screen.contains("csv_data"));
        assert!(screen.contains("2025_03_19_restorepoints"));
        assert!(screen.contains("Cluster Name"));
        assert!(screen.contains("lin-netapp02"));
        assert!(screen.contains("Page 1 of 1"));
    }

    #[test]
    fn renders_help_popup() {
        let mut model = loaded_model();
        model.update(Some(Message::Help)).unwrap();
        let screen = render(&model, 100, 30);
        assert!(screen.contains("Help"));
        assert!(screen.contains("Esc to close"));
    }

    #[test]
    fn renders_distribution_chart() {
        let mut model = loaded_model();
        model.update(Some(Message::Distribution)).unwrap();
        let screen = render(&model, 100, 30);
        assert!(screen.contains("Distribution"));
        assert!(screen.contains("lin-netapp01"));
    }

    #[test]
    fn renders_trend_chart() {
        let mut model = loaded_model();
        for _ in 0..8 {
            model.update(Some(Message::MoveRight)).unwrap();
        }
        model.update(Some(Message::Trend)).unwrap();
        assert_eq!(model.get_uidata().trend.len(), 3);
        let screen = render(&model, 100, 30);
        assert!(screen.contains("Trend"));
        assert!(screen.contains("n01_a01"));
        assert!(screen.contains("1001.0"));
    }

    #[test]
    fn empty_dashboard_does_not_panic() {
        let (tx, _rx) = mpsc::channel();
        let model = Model::init(&DaveConfig::default(), tx, 20);
        let screen = render(&model, 20, 5);
        assert!(screen.contains("No data"));
    }
}
