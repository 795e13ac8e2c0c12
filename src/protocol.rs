use std::fmt;

pub const ESTABLISHED: &str = "Server > Connection Established!\n";

pub const REFUSED: &str =
    "Server > Connection Refused (ERROR: 508). Server limits reached, try again later.\n";

pub const WELCOME: &str = "WELCOME TO THE RESOURCE VISUALIZER SERVER!\n\n";

pub const MENU: &str = "\
-------------LIST OF COMMANDS--------------
|    cpu -> view cpu usage                |
|    memory -> view memory usage          |
|    /exit -> exit from client application|
|    /shutdown -> turn off server         |
-------------------------------------------\n\n";

pub const INVALID: &str = "Server > Invalid command.\n";

pub const STOPPED: &str = "Server > Monitoring stopped.\n";

pub const CLOSED: &str = "Server > Connection Closed!\n";

pub const SHUTTING_DOWN: &str = "Server > Shutting down...\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Cpu,
    Memory,
}

impl Metric {
    pub fn label(self) -> &'static str {
        match self {
            Metric::Cpu => "CPU",
            Metric::Memory => "MEMORY",
        }
    }

    pub fn ack(self) -> &'static str {
        match self {
            Metric::Cpu => "Monitoring CPU usage. Type 'X' to stop.\n",
            Metric::Memory => "Monitoring memory usage. Type 'X' to stop.\n",
        }
    }

    /// One streamed sample, e.g. `CPU: 12.5%`. The value is written as the
    /// provider returned it.
    pub fn reading(self, value: f64) -> String {
        format!("{}: {}%\n", self.label(), value)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Monitor(Metric),
    Stop,
    Exit,
    Shutdown,
    Unknown(String),
}

impl Command {
    /// Whether this command breaks an active stream of `current`.
    ///
    /// Stop, a different metric, and the session-ending commands interrupt.
    /// Repeating the current metric or sending garbage does not.
    pub fn interrupts(&self, current: Metric) -> bool {
        match self {
            Command::Monitor(metric) => *metric != current,
            Command::Stop | Command::Exit | Command::Shutdown => true,
            Command::Unknown(_) => false,
        }
    }
}

/// Normalizes a raw line (trim, uppercase) into a command.
/// Returns `None` for blank input.
pub fn parse_command(line: &str) -> Option<Command> {
    let cmd = line.trim().to_uppercase();

    let parsed = match cmd.as_str() {
        "" => return None,
        "CPU" => Command::Monitor(Metric::Cpu),
        "MEMORY" => Command::Monitor(Metric::Memory),
        "X" => Command::Stop,
        "/EXIT" => Command::Exit,
        "/SHUTDOWN" => Command::Shutdown,
        _ => Command::Unknown(cmd),
    };

    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive_and_trims() {
        assert_eq!(parse_command("  cpu \r"), Some(Command::Monitor(Metric::Cpu)));
        assert_eq!(parse_command("Memory"), Some(Command::Monitor(Metric::Memory)));
        assert_eq!(parse_command("x"), Some(Command::Stop));
        assert_eq!(parse_command("/exit"), Some(Command::Exit));
        assert_eq!(parse_command("/ShutDown"), Some(Command::Shutdown));
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("   \t"), None);
    }

    #[test]
    fn unknown_commands_keep_normalized_text() {
        assert_eq!(
            parse_command(" memoria "),
            Some(Command::Unknown("MEMORIA".into()))
        );
    }

    #[test]
    fn interrupt_rules() {
        assert!(Command::Stop.interrupts(Metric::Cpu));
        assert!(Command::Monitor(Metric::Memory).interrupts(Metric::Cpu));
        assert!(Command::Exit.interrupts(Metric::Memory));
        assert!(Command::Shutdown.interrupts(Metric::Memory));
        assert!(!Command::Monitor(Metric::Cpu).interrupts(Metric::Cpu));
        assert!(!Command::Unknown("FOO".into()).interrupts(Metric::Cpu));
    }

    #[test]
    fn readings_use_uppercase_labels() {
        assert_eq!(Metric::Cpu.reading(12.5), "CPU: 12.5%\n");
        assert_eq!(Metric::Memory.reading(45.67), "MEMORY: 45.67%\n");
    }
}
