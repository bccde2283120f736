//! Terminal waveform plot
//!
//! Draws the denoised waveform as a column-wise min/max trace with dashed
//! red markers at each onset, then waits for a key press before returning.

use std::io::{self, IsTerminal, Write};

use crossterm::{
    event::{self, Event},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal,
};
use log::debug;

use crate::engine::AudioSignal;
use crate::error::{OnsetError, Result};
use crate::pipeline::WaveformRenderer;

pub const TITLE: &str = "Waveform with Onsets";
pub const X_LABEL: &str = "Time (s)";
pub const Y_LABEL: &str = "Amplitude";

/// Columns taken by the amplitude labels and the axis
const LABEL_COLUMNS: usize = 10;
/// Rows taken by title, labels, ticks, legend, prompt and the summary line
const CHROME_ROWS: usize = 9;

/// Plot area size in terminal cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotParams {
    pub width: usize,
    pub height: usize,
}

impl Default for PlotParams {
    fn default() -> Self {
        Self {
            width: 100,
            height: 20,
        }
    }
}

impl PlotParams {
    /// Plot area that fits a terminal of `columns` x `rows`
    pub fn fit(columns: u16, rows: u16) -> Self {
        Self {
            width: (columns as usize).saturating_sub(LABEL_COLUMNS + 1).max(20),
            height: (rows as usize).saturating_sub(CHROME_ROWS).max(5),
        }
    }

    /// Fit the current terminal, falling back to the default size
    pub fn from_terminal() -> Self {
        match terminal::size() {
            Ok((columns, rows)) => Self::fit(columns, rows),
            Err(e) => {
                debug!("Terminal size unavailable ({}), using default plot size", e);
                Self::default()
            }
        }
    }
}

/// One character cell of the plot area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Wave,
    Marker,
}

/// Rasterized plot: rows top to bottom, amplitude decreasing downwards
#[derive(Debug, Clone)]
pub struct WaveformFigure {
    pub cells: Vec<Vec<Cell>>,
    pub min_amplitude: f32,
    pub max_amplitude: f32,
    pub duration_secs: f64,
}

impl WaveformFigure {
    pub fn build(signal: &AudioSignal, onsets_secs: &[f64], params: PlotParams) -> Self {
        let width = params.width.max(1);
        let height = params.height.max(2);
        let mut cells = vec![vec![Cell::Empty; width]; height];
        let (lo, hi) = match signal.amplitude_range() {
            Some((lo, hi)) if hi > lo => (lo, hi),
            Some((v, _)) => (v - 1.0, v + 1.0),
            None => (-1.0, 1.0),
        };

        let row_of = |amplitude: f32| -> usize {
            let norm = (hi - amplitude) / (hi - lo);
            ((norm * (height - 1) as f32).round() as usize).min(height - 1)
        };

        // Column extents over the time axis
        let duration_secs = signal.duration_secs();
        let mut extents = vec![(f32::INFINITY, f32::NEG_INFINITY); width];
        for (&t, &s) in signal.time_axis().iter().zip(signal.samples()) {
            let col = ((t / duration_secs * width as f64) as usize).min(width - 1);
            let (col_lo, col_hi) = &mut extents[col];
            *col_lo = col_lo.min(s);
            *col_hi = col_hi.max(s);
        }
        for (col, &(col_lo, col_hi)) in extents.iter().enumerate() {
            if col_lo > col_hi {
                continue;
            }
            for row in row_of(col_hi)..=row_of(col_lo) {
                cells[row][col] = Cell::Wave;
            }
        }

        for &onset in onsets_secs {
            if duration_secs <= 0.0 || onset < 0.0 || onset > duration_secs {
                continue;
            }
            let col = ((onset / duration_secs * width as f64) as usize).min(width - 1);
            // Dashed: every other row
            for row in (0..height).step_by(2) {
                cells[row][col] = Cell::Marker;
            }
        }

        Self {
            cells,
            min_amplitude: lo,
            max_amplitude: hi,
            duration_secs,
        }
    }

    pub fn width(&self) -> usize {
        self.cells.first().map_or(0, |r| r.len())
    }

    pub fn height(&self) -> usize {
        self.cells.len()
    }

    /// Columns holding an onset marker
    pub fn marker_columns(&self) -> Vec<usize> {
        (0..self.width())
            .filter(|&c| self.cells[0][c] == Cell::Marker)
            .collect()
    }
}

/// Terminal renderer that blocks until a key is pressed
#[derive(Debug, Clone)]
pub struct TerminalPlot {
    params: PlotParams,
}

impl Default for TerminalPlot {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalPlot {
    /// Renderer sized to the current terminal
    pub fn new() -> Self {
        Self::with_params(PlotParams::from_terminal())
    }

    pub fn with_params(params: PlotParams) -> Self {
        Self { params }
    }

    fn draw<W: Write>(&self, out: &mut W, figure: &WaveformFigure) -> io::Result<()> {
        let label_width = LABEL_COLUMNS;
        let pad = " ".repeat(label_width);
        let centre = |text: &str| {
            let offset = (figure.width().saturating_sub(text.len())) / 2;
            format!("{}{}{}", pad, " ".repeat(offset), text)
        };

        execute!(out, Print(centre(TITLE)), Print("\r\n"))?;
        execute!(out, Print(format!("{}\r\n", Y_LABEL)))?;

        for (i, row) in figure.cells.iter().enumerate() {
            let label = if i == 0 {
                format!("{:>9.3e}", figure.max_amplitude)
            } else if i == figure.height() - 1 {
                format!("{:>9.3e}", figure.min_amplitude)
            } else {
                " ".repeat(9)
            };
            execute!(out, Print(label), Print("│"))?;
            for cell in row {
                match cell {
                    Cell::Empty => execute!(out, Print(' '))?,
                    Cell::Wave => execute!(out, SetForegroundColor(Color::Blue), Print('█'), ResetColor)?,
                    Cell::Marker => execute!(out, SetForegroundColor(Color::Red), Print('┆'), ResetColor)?,
                }
            }
            execute!(out, Print("\r\n"))?;
        }

        execute!(
            out,
            Print(format!("{}└{}\r\n", " ".repeat(label_width - 1), "─".repeat(figure.width()))),
            Print(format!(
                "{}0{:>width$.2}\r\n",
                pad,
                figure.duration_secs,
                width = figure.width().saturating_sub(1)
            )),
            Print(centre(X_LABEL)),
            Print("\r\n"),
            Print(&pad),
            SetForegroundColor(Color::Blue),
            Print("█ Waveform   "),
            SetForegroundColor(Color::Red),
            Print("┆ Onsets"),
            ResetColor,
            Print("\r\n")
        )?;
        out.flush()
    }

    fn wait_for_key() -> io::Result<()> {
        terminal::enable_raw_mode()?;
        let result = loop {
            match event::read() {
                Ok(Event::Key(_)) => break Ok(()),
                Ok(_) => continue,
                Err(e) => break Err(e),
            }
        };
        terminal::disable_raw_mode()?;
        result
    }
}

impl WaveformRenderer for TerminalPlot {
    fn render(&self, signal: &AudioSignal, onsets_secs: &[f64]) -> Result<()> {
        let figure = WaveformFigure::build(signal, onsets_secs, self.params);
        let to_render_error = |e: io::Error| OnsetError::RenderError {
            reason: e.to_string(),
            source: Some(e),
        };

        let mut stdout = io::stdout();
        self.draw(&mut stdout, &figure).map_err(to_render_error)?;

        if !io::stdin().is_terminal() {
            debug!("stdin is not a terminal, not waiting for a key press");
            return Ok(());
        }
        execute!(stdout, Print("Press any key to close\r\n")).map_err(to_render_error)?;
        Self::wait_for_key().map_err(to_render_error)
    }
}
