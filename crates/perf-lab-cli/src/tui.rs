use std::{
    io,
    time::{Duration, Instant},
};

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use perf_lab_abstract::{Mode, Param, ServerKind, TestKind};
use perf_lab_client::{Inbound, SupervisorHandle};
use perf_lab_core::format::{format_bandwidth, format_jitter, format_latency, format_percent};
use perf_lab_core::{ClientState, Connectivity, Console, Intent, LogLevel, RunStatus, Series};
use ratatui::{
    prelude::*,
    widgets::{
        Axis, Block, Borders, Chart, Dataset, Gauge, GraphType, List, ListItem, Paragraph, Row,
        Table,
    },
};
use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};

use crate::export::{ExportTargets, write_exports};
use crate::logbuf::MemoryLogBuffer;

/// Live dashboard. Owns the console and drains supervisor messages every tick.
pub struct Dashboard {
    console: Console<SupervisorHandle>,
    inbound: UnboundedReceiver<Inbound>,
    diagnostics: Option<MemoryLogBuffer>,
    show_diagnostics: bool,
    exports: ExportTargets,
    supervisor_gone: bool,
}

impl Dashboard {
    pub fn new(
        console: Console<SupervisorHandle>,
        inbound: UnboundedReceiver<Inbound>,
        diagnostics: Option<MemoryLogBuffer>,
        exports: ExportTargets,
    ) -> Self {
        Self {
            console,
            inbound,
            diagnostics,
            show_diagnostics: false,
            exports,
            supervisor_gone: false,
        }
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let tick_rate = Duration::from_millis(100);
        let mut last_tick = Instant::now();

        loop {
            terminal.draw(|f| self.ui(f))?;

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));

            if crossterm::event::poll(timeout)?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
                && !self.handle_key(key.code)
            {
                break;
            }

            if last_tick.elapsed() >= tick_rate {
                self.drain_inbound();
                last_tick = Instant::now();
            }
        }

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        Ok(())
    }

    pub fn into_console(self) -> Console<SupervisorHandle> {
        self.console
    }

    fn drain_inbound(&mut self) {
        loop {
            match self.inbound.try_recv() {
                Ok(Inbound::Connected) => self.console.on_connected(),
                Ok(Inbound::Disconnected) => self.console.on_disconnected(),
                Ok(Inbound::Payload(text)) => self.console.handle_payload(&text),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.supervisor_gone {
                        self.console
                            .record(LogLevel::Error, "Connection supervisor stopped");
                        self.supervisor_gone = true;
                    }
                    break;
                }
            }
        }
    }

    /// Returns `false` when the user asked to quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') => return false,
            KeyCode::Char('m') => {
                let mode = self.console.state().session.mode().toggled();
                let _ = self.console.set_mode(mode);
            }
            KeyCode::Char(c @ '1'..='6') => {
                let index = c as usize - '1' as usize;
                let _ = self.console.select_test(TestKind::ALL[index]);
            }
            KeyCode::Char('s') => {
                let _ = self.console.submit(Intent::StartTest);
            }
            KeyCode::Char('x') => {
                let _ = self.console.submit(Intent::StopTest);
            }
            KeyCode::Char('t') => self.toggle_server(ServerKind::Throughput),
            KeyCode::Char('l') => self.toggle_server(ServerKind::Latency),
            KeyCode::Char('r') => {
                let _ = self.console.submit(Intent::RefreshServerStatus);
            }
            KeyCode::Char('g') => {
                let _ = self.console.submit(Intent::RequestStats);
            }
            KeyCode::Char('e') => self.export(),
            KeyCode::Char('d') => self.show_diagnostics = !self.show_diagnostics,
            KeyCode::Char('c') => {
                if self.console.state().session.is_idle() {
                    self.console.reset();
                    self.console.record(LogLevel::Info, "Cleared run data");
                } else {
                    self.console
                        .record(LogLevel::Error, "Stop the running test before clearing");
                }
            }
            _ => {}
        }
        true
    }

    fn toggle_server(&mut self, server: ServerKind) {
        let status = self.console.state().server_status;
        let running = match server {
            ServerKind::Throughput => status.throughput_running,
            ServerKind::Latency => status.latency_running,
        };
        let intent = if running {
            Intent::StopServer(server)
        } else {
            Intent::StartServer(server)
        };
        let _ = self.console.submit(intent);
    }

    fn export(&mut self) {
        let targets = self.exports.or_timestamped(chrono::Local::now());
        match write_exports(self.console.state(), &targets) {
            Ok(paths) if paths.is_empty() => {
                self.console.record(LogLevel::Info, "Nothing to export");
            }
            Ok(paths) => {
                let names: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                self.console
                    .record(LogLevel::Success, format!("Exported {}", names.join(", ")));
            }
            Err(err) => self.console.record(LogLevel::Error, format!("{err:#}")),
        }
    }

    fn ui(&self, f: &mut Frame) {
        let state = self.console.state();
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),  // Control bar
                Constraint::Min(10),    // Charts
                Constraint::Length(10), // Results, sweep, servers
                Constraint::Length(10), // Log
            ])
            .split(f.area());

        self.render_control(f, rows[0], state);

        let charts = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[1]);
        render_chart(
            f,
            charts[0],
            "Bandwidth (Mbps)",
            state,
            &[(Series::Bandwidth, "bandwidth", Color::Cyan)],
        );
        render_chart(
            f,
            charts[1],
            "Latency (μs)",
            state,
            &[
                (Series::LatencyAvg, "avg", Color::Green),
                (Series::LatencyP99, "p99", Color::Yellow),
            ],
        );

        let details = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(35),
                Constraint::Percentage(45),
                Constraint::Percentage(20),
            ])
            .split(rows[2]);
        render_results(f, details[0], state);
        render_sweep(f, details[1], state);
        render_servers(f, details[2], state);

        self.render_log(f, rows[3], state);
    }

    fn render_control(&self, f: &mut Frame, area: Rect, state: &ClientState) {
        let session = &state.session;
        let request = &state.request;
        let target = if request.kind.accepts(Param::Port) {
            format!("{}:{}", request.host, request.effective_port())
        } else {
            request.host.clone()
        };
        let link = match state.connectivity {
            Connectivity::Connected => Span::styled("connected", Style::default().fg(Color::Green)),
            Connectivity::Disconnected => {
                Span::styled("disconnected", Style::default().fg(Color::Red))
            }
        };
        let status_style = match session.status() {
            RunStatus::Idle => Style::default(),
            RunStatus::Running => Style::default().fg(Color::Green),
            RunStatus::Stopping => Style::default().fg(Color::Yellow),
        };
        let mode = match session.mode() {
            Mode::Generator => "GENERATOR",
            Mode::Listener => "LISTENER",
        };

        let lines = vec![
            Line::from(vec![
                Span::raw(format!("Mode: {mode} | Test: {} -> {target} | Status: ", request.kind)),
                Span::styled(session.status().to_string(), status_style),
                Span::raw(" | Link: "),
                link,
            ]),
            Line::from(
                "(q)uit (m)ode (1-6)test (s)tart (x)stop (t)/(l) servers (r)efresh (g)stats (e)xport (d)iagnostics (c)lear",
            ),
        ];
        let control = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("perf-lab"));
        f.render_widget(control, area);
    }

    fn render_log(&self, f: &mut Frame, area: Rect, state: &ClientState) {
        let visible = (area.height.max(3) - 2) as usize;

        if self.show_diagnostics
            && let Some(buffer) = &self.diagnostics
        {
            let items: Vec<ListItem> = buffer.tail(visible).into_iter().map(ListItem::new).collect();
            let list =
                List::new(items).block(Block::default().borders(Borders::ALL).title("Diagnostics"));
            f.render_widget(list, area);
            return;
        }

        let entries = state.log.entries();
        let items: Vec<ListItem> = entries
            .iter()
            .skip(entries.len().saturating_sub(visible))
            .map(|entry| {
                let style = match entry.level {
                    LogLevel::Info => Style::default().fg(Color::White),
                    LogLevel::Success => Style::default().fg(Color::Green),
                    LogLevel::Error => Style::default().fg(Color::Red),
                };
                let text = format!("[{}] {}", entry.label, entry.message);
                ListItem::new(Line::from(Span::styled(text, style)))
            })
            .collect();
        let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Activity"));
        f.render_widget(list, area);
    }
}

fn render_chart(
    f: &mut Frame,
    area: Rect,
    title: &str,
    state: &ClientState,
    series: &[(Series, &'static str, Color)],
) {
    let telemetry = &state.telemetry;
    let points: Vec<Vec<(f64, f64)>> = series.iter().map(|(s, _, _)| telemetry.points(*s)).collect();

    let y_max = points
        .iter()
        .flatten()
        .map(|(_, y)| *y)
        .fold(f64::MIN, f64::max);
    if y_max == f64::MIN {
        let block = Paragraph::new("Waiting for data")
            .block(Block::default().borders(Borders::ALL).title(title.to_string()));
        f.render_widget(block, area);
        return;
    }
    let y_max = (y_max * 1.1).max(1.0);
    let x_max = (telemetry.len().saturating_sub(1) as f64).max(1.0);

    let datasets: Vec<Dataset> = series
        .iter()
        .zip(&points)
        .map(|((_, name, color), data)| {
            Dataset::default()
                .name(*name)
                .marker(symbols::Marker::Braille)
                .style(Style::default().fg(*color))
                .graph_type(GraphType::Line)
                .data(data)
        })
        .collect();

    let labels = telemetry.labels();
    let x_labels = vec![
        Span::raw(labels.front().cloned().unwrap_or_default()),
        Span::raw(labels.back().cloned().unwrap_or_default()),
    ];
    let y_labels = vec![Span::raw("0"), Span::raw(format!("{:.0}", y_max))];

    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .x_axis(Axis::default().bounds([0.0, x_max]).labels(x_labels))
        .y_axis(Axis::default().bounds([0.0, y_max]).labels(y_labels));
    f.render_widget(chart, area);
}

fn render_results(f: &mut Frame, area: Rect, state: &ClientState) {
    let latest = &state.latest;
    let row = |name: &str, value: Option<String>| {
        Line::from(format!(
            "{name:<12}{}",
            value.unwrap_or_else(|| "-".to_string())
        ))
    };
    let lines = vec![
        row("Bandwidth", latest.bandwidth_mbps.map(format_bandwidth)),
        row("Latency avg", latest.latency_avg_us.map(format_latency)),
        row("Latency p50", latest.latency_p50_us.map(format_latency)),
        row("Latency p99", latest.latency_p99_us.map(format_latency)),
        row("Jitter", latest.jitter_ms.map(format_jitter)),
        row("Loss", latest.loss_percent().map(format_percent)),
        row("Retransmits", latest.retransmits.map(|v| v.to_string())),
        row(
            "Packets",
            latest
                .packets_sent
                .map(|sent| match latest.packets_received {
                    Some(received) => format!("{received}/{sent}"),
                    None => sent.to_string(),
                }),
        ),
    ];
    let block = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Results"));
    f.render_widget(block, area);
}

fn render_sweep(f: &mut Frame, area: Rect, state: &ClientState) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let label = match state.sweep.state() {
        Some(sweep) => format!(
            "{}/{} sizes, now {} bytes",
            sweep.ordinal, sweep.total, sweep.current_size
        ),
        None if state.sweep.final_results().is_some() => "complete".to_string(),
        None => "idle".to_string(),
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Sweep"))
        .gauge_style(Style::default().fg(Color::Magenta))
        .percent(u16::from(state.sweep.percent()))
        .label(label);
    f.render_widget(gauge, parts[0]);

    let rows: Vec<Row> = state
        .sweep
        .results()
        .iter()
        .map(|p| {
            Row::new(vec![
                p.payload_size.to_string(),
                format_latency(p.avg),
                format_latency(p.p50),
                format_latency(p.p99),
                format_latency(p.max),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(11),
            Constraint::Length(11),
            Constraint::Length(11),
            Constraint::Length(11),
        ],
    )
    .header(
        Row::new(vec!["Bytes", "Avg", "P50", "P99", "Max"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM));
    f.render_widget(table, parts[1]);
}

fn render_servers(f: &mut Frame, area: Rect, state: &ClientState) {
    let line = |name: &str, running: bool| {
        let (text, color) = if running {
            ("running", Color::Green)
        } else {
            ("stopped", Color::DarkGray)
        };
        Line::from(vec![
            Span::raw(format!("{name:<9}")),
            Span::styled(text, Style::default().fg(color)),
        ])
    };
    let status = state.server_status;
    let lines = vec![
        line("iperf3", status.throughput_running),
        line("sockperf", status.latency_running),
    ];
    let block = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Servers"));
    f.render_widget(block, area);
}
