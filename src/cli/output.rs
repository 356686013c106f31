//! Colored terminal output for pipeline commands.
//!
//! Results (captured command output, artifact paths, matrix listings) go to
//! stdout; progress and diagnostics are decorated and can be silenced with
//! `--quiet`. Errors always go to stderr.

use std::io::Write;
use termcolor::{BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

/// Output manager for consistent colored terminal output
#[derive(Debug)]
pub struct OutputManager {
    bufwtr: BufferWriter,
    quiet: bool,
}

impl Clone for OutputManager {
    fn clone(&self) -> Self {
        Self::new(self.quiet)
    }
}

impl OutputManager {
    pub fn new(quiet: bool) -> Self {
        Self {
            bufwtr: BufferWriter::stdout(ColorChoice::Auto),
            quiet,
        }
    }

    fn decorated(&self, symbol: &str, color: Color, bold: bool, message: &str) {
        if self.quiet {
            return;
        }

        let mut buffer = self.bufwtr.buffer();
        let _ = buffer.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(bold));
        let _ = write!(&mut buffer, "{}", symbol);
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, " {}", message);
        let _ = self.bufwtr.print(&buffer);
    }

    pub fn info(&self, message: &str) {
        self.decorated("ℹ", Color::Cyan, false, message);
    }

    pub fn success(&self, message: &str) {
        self.decorated("✓", Color::Green, true, message);
    }

    pub fn warn(&self, message: &str) {
        self.decorated("⚠", Color::Yellow, true, message);
    }

    /// Progress line for a long-running phase
    pub fn progress(&self, message: &str) {
        self.decorated("⋯", Color::Magenta, false, message);
    }

    /// Print an error message (always shown)
    pub fn error(&self, message: &str) {
        let bufwtr = BufferWriter::stderr(ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();

        if buffer.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true)).is_err()
            || write!(&mut buffer, "✗").is_err()
            || buffer.reset().is_err()
            || buffer.set_color(ColorSpec::new().set_fg(Some(Color::Red))).is_err()
            || writeln!(&mut buffer, " {}", message).is_err()
            || buffer.reset().is_err()
            || bufwtr.print(&buffer).is_err()
        {
            eprintln!("✗ {}", message);
        }
    }

    /// Diagnostic text under an error (always shown, stderr)
    pub fn error_detail(&self, message: &str) {
        let bufwtr = BufferWriter::stderr(ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        for line in message.lines() {
            let _ = writeln!(&mut buffer, "    {}", line);
        }
        if bufwtr.print(&buffer).is_err() {
            eprintln!("{}", message);
        }
    }

    /// Undecorated line on stderr (always shown)
    pub fn println_err(&self, message: &str) {
        let bufwtr = BufferWriter::stderr(ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = writeln!(&mut buffer, "{}", message);
        if bufwtr.print(&buffer).is_err() {
            eprintln!("{}", message);
        }
    }

    pub fn section(&self, title: &str) {
        if self.quiet {
            return;
        }

        let mut buffer = self.bufwtr.buffer();
        let _ = writeln!(&mut buffer);
        let _ = buffer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
        let _ = writeln!(&mut buffer, "═══ {} ═══", title);
        let _ = buffer.reset();
        let _ = self.bufwtr.print(&buffer);
    }

    /// Print indented text (for sub-items)
    pub fn indent(&self, message: &str) {
        if self.quiet {
            return;
        }

        let mut buffer = self.bufwtr.buffer();
        let _ = writeln!(&mut buffer, "    {}", message);
        let _ = self.bufwtr.print(&buffer);
    }

    /// Command results. Printed even in quiet mode.
    pub fn result(&self, text: &str) {
        let mut buffer = self.bufwtr.buffer();
        let _ = write!(&mut buffer, "{}", text);
        if !text.is_empty() && !text.ends_with('\n') {
            let _ = writeln!(&mut buffer);
        }
        let _ = self.bufwtr.print(&buffer);
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
