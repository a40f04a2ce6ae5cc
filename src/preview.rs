// SPDX-License-Identifier: GPL-3.0-only

//! Terminal preview
//!
//! Renders frames to the terminal using Unicode half-block characters
//! for improved vertical resolution. Used as the processing loop's local
//! preview, by `camfx preview-camera` to try effects on a camera directly,
//! and by `camfx preview-virtual` to watch the published source.

use crate::backends::camera::types::Frame;
use crate::backends::virtual_camera::{InputAdapter, RetryPolicy};
use crate::errors::AppResult;
use crate::pipelines::PreviewSink;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::io::{self, Stdout, stdout};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Raw-mode alternate screen, restored on drop
struct Screen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Screen {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }

    fn draw(&mut self, widget: &FrameWidget, message: &str) -> io::Result<()> {
        self.terminal.draw(|f| {
            let area = f.area();

            // Reserve bottom line for status
            let frame_area = Rect {
                height: area.height.saturating_sub(1),
                ..area
            };
            f.render_widget(widget, frame_area);

            let status_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(1),
                width: area.width,
                height: 1,
            };
            f.render_widget(StatusBar { message }, status_area);
        })?;
        Ok(())
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Whether `key` asks to quit (`q` or Ctrl+C)
fn is_quit(code: KeyCode, modifiers: KeyModifiers) -> bool {
    code == KeyCode::Char('q')
        || (code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL))
}

/// Poll for a quit key for at most `timeout`
fn quit_requested(timeout: Duration) -> io::Result<bool> {
    if event::poll(timeout)?
        && let Event::Key(key) = event::read()?
        && key.kind == KeyEventKind::Press
    {
        return Ok(is_quit(key.code, key.modifiers));
    }
    Ok(false)
}

/// Preview sink for the processing loop
///
/// Quitting from the preview sets `quit`, which is expected to be the loop's
/// stop signal: raw mode swallows the Ctrl+C signal.
pub struct TerminalPreview {
    screen: Screen,
    widget: FrameWidget,
    quit: Arc<AtomicBool>,
    message: String,
}

impl TerminalPreview {
    /// Preview beside the published virtual camera `name`
    pub fn new(name: &str, quit: Arc<AtomicBool>) -> io::Result<Self> {
        Self::with_message(
            format!("camfx preview: publishing as '{}' | 'q' quit", name),
            quit,
        )
    }

    /// Preview of a camera that is not published anywhere
    pub fn camera(source: &str, quit: Arc<AtomicBool>) -> io::Result<Self> {
        Self::with_message(format!("camfx preview: camera {} | 'q' quit", source), quit)
    }

    fn with_message(message: String, quit: Arc<AtomicBool>) -> io::Result<Self> {
        Ok(Self {
            screen: Screen::enter()?,
            widget: FrameWidget::new("Waiting for camera..."),
            quit,
            message,
        })
    }
}

impl PreviewSink for TerminalPreview {
    fn show(&mut self, frame: &Frame) -> io::Result<()> {
        self.widget.update_frame(frame.clone());
        self.screen.draw(&self.widget, &self.message)?;
        if quit_requested(Duration::ZERO)? {
            info!("Quit requested from preview");
            self.quit.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Watch the virtual camera called `name` until `q` or Ctrl+C
pub fn run_virtual_preview(name: &str, policy: RetryPolicy) -> AppResult<()> {
    let mut input = InputAdapter::open(name, policy)?;
    let mut screen = Screen::enter()?;
    let mut widget = FrameWidget::new("Waiting for virtual camera...");

    let mut frames: u64 = 0;
    let mut window_start = Instant::now();
    let mut rate = 0.0;

    loop {
        if let Some(frame) = input.read() {
            frames += 1;
            widget.update_frame(frame);
        }

        let elapsed = window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            rate = frames as f64 / elapsed.as_secs_f64();
            frames = 0;
            window_start = Instant::now();
        }

        let message = match &widget.frame {
            Some(frame) => format!(
                "'{}' {}x{} {:.1} fps | 'q' quit",
                name, frame.width, frame.height, rate
            ),
            None => format!("'{}' waiting | 'q' quit", name),
        };
        screen.draw(&widget, &message)?;

        // Handle input with timeout for frame updates
        if quit_requested(Duration::from_millis(16))? {
            break;
        }
    }

    drop(screen);
    input.release();
    if input.is_closed() {
        info!(name, "Virtual camera preview closed");
    } else {
        warn!(name, "Virtual camera input still open after release");
    }
    Ok(())
}

/// Widget that renders a frame using half-block characters
struct FrameWidget {
    frame: Option<Frame>,
    placeholder: &'static str,
}

impl FrameWidget {
    fn new(placeholder: &'static str) -> Self {
        Self {
            frame: None,
            placeholder,
        }
    }

    fn update_frame(&mut self, frame: Frame) {
        self.frame = Some(frame);
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = self.frame.as_ref().filter(|f| f.width > 0 && f.height > 0) else {
            let msg = self.placeholder;
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, ratatui::style::Style::default());
            }
            return;
        };

        // Each terminal cell displays 2 vertical pixels
        let frame_aspect = frame.width as f64 / frame.height as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            let h = term_height;
            let w = h * frame_aspect;
            (w as u16, (h / 2.0) as u16)
        } else {
            let w = term_width;
            let h = w / frame_aspect;
            (w as u16, (h / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = frame.width as f64 / display_width as f64;
        let y_scale = frame.height as f64 / (display_height * 2) as f64;

        // Upper half (▀) is the fg color, lower half the bg color
        for ty in 0..display_height {
            for tx in 0..display_width {
                let term_x = x_offset + tx;
                let term_y = y_offset + ty;

                if term_x >= area.x + area.width || term_y >= area.y + area.height {
                    continue;
                }

                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(color(frame.pixel(src_x, src_y_top)));
                    cell.set_bg(color(frame.pixel(src_x, src_y_bottom)));
                }
            }
        }
    }
}

fn color([r, g, b]: [u8; 3]) -> Color {
    Color::Rgb(r, g, b)
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            ratatui::style::Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_keys() {
        assert!(is_quit(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(is_quit(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(!is_quit(KeyCode::Char('c'), KeyModifiers::NONE));
    }

    #[test]
    fn test_frame_widget_renders_half_blocks() {
        let mut frame = Frame::black(2, 2);
        frame.data[..3].copy_from_slice(&[255, 0, 0]);
        let mut widget = FrameWidget::new("waiting");
        widget.update_frame(frame);

        let area = Rect::new(0, 0, 2, 1);
        let mut buf = Buffer::empty(area);
        (&widget).render(area, &mut buf);

        let cell = &buf[(0, 0)];
        assert_eq!(cell.symbol(), "▀");
        assert_eq!(cell.fg, Color::Rgb(255, 0, 0));
    }

    #[test]
    fn test_placeholder_without_frame() {
        let widget = FrameWidget::new("wait");
        let area = Rect::new(0, 0, 8, 1);
        let mut buf = Buffer::empty(area);
        (&widget).render(area, &mut buf);
        assert_eq!(buf[(2, 0)].symbol(), "w");
    }
}
