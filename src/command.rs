use std::fmt;

pub const DEFAULT_ALARM_MESSAGE: &str = "This window is forbidden!";

/// Arguments carried by `forbidden_alarm`, up to three `|`-delimited fields:
/// window class, window title, message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmArgs {
    pub window_class: String,
    pub window_title: String,
    pub message: String,
}

impl AlarmArgs {
    pub fn parse(args: Option<&str>) -> Self {
        let mut parsed = Self {
            window_class: String::new(),
            window_title: String::new(),
            message: DEFAULT_ALARM_MESSAGE.to_string(),
        };

        if let Some(args) = args {
            let mut fields = args.splitn(3, '|');
            if let Some(class) = fields.next() {
                parsed.window_class = class.to_string();
            }
            if let Some(title) = fields.next() {
                parsed.window_title = title.to_string();
            }
            if let Some(message) = fields.next() {
                parsed.message = message.to_string();
            }
        }

        parsed
    }
}

/// A recognized control-channel command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    ReloadConfig,
    ForbiddenAlarm(AlarmArgs),
    DismissAlarm,
    ResetDeadline,
    ToggleScreenSampling,
}

impl Command {
    /// Parse one request line of the form `command` or `command:args`.
    /// Unknown names come back as `Err` with the offending name so the
    /// server can echo it.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (name, args) = match line.split_once(':') {
            Some((name, args)) => (name, Some(args)),
            None => (line, None),
        };

        match name {
            "status" => Ok(Self::Status),
            "reload_config" => Ok(Self::ReloadConfig),
            "forbidden_alarm" => Ok(Self::ForbiddenAlarm(AlarmArgs::parse(args))),
            "dismiss_alarm" => Ok(Self::DismissAlarm),
            "reset_deadline" => Ok(Self::ResetDeadline),
            "toggle_screen_sampling" => Ok(Self::ToggleScreenSampling),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => write!(f, "status"),
            Self::ReloadConfig => write!(f, "reload_config"),
            Self::ForbiddenAlarm(args) => write!(
                f,
                "forbidden_alarm:{}|{}|{}",
                args.window_class, args.window_title, args.message
            ),
            Self::DismissAlarm => write!(f, "dismiss_alarm"),
            Self::ResetDeadline => write!(f, "reset_deadline"),
            Self::ToggleScreenSampling => write!(f, "toggle_screen_sampling"),
        }
    }
}

/// The single-line reply: `OK`, `OK:<payload>`, or `ERROR:<message>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Payload(String),
    Error(String),
}

impl Response {
    pub fn unknown_command(name: &str) -> Self {
        Self::Error(format!("Unknown command '{name}'"))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => writeln!(f, "OK"),
            Self::Payload(payload) => writeln!(f, "OK:{payload}"),
            Self::Error(message) => writeln!(f, "ERROR:{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_commands_parse() {
        assert_eq!(Command::parse("status"), Ok(Command::Status));
        assert_eq!(Command::parse("reload_config"), Ok(Command::ReloadConfig));
        assert_eq!(Command::parse("dismiss_alarm"), Ok(Command::DismissAlarm));
        assert_eq!(Command::parse("reset_deadline"), Ok(Command::ResetDeadline));
        assert_eq!(
            Command::parse("toggle_screen_sampling"),
            Ok(Command::ToggleScreenSampling)
        );
        assert_eq!(Command::parse("  status \n"), Ok(Command::Status));
    }

    #[test]
    fn unknown_command_returns_name() {
        assert_eq!(Command::parse("foo"), Err("foo".to_string()));
        assert_eq!(Command::parse("foo:bar"), Err("foo".to_string()));
        assert_eq!(
            Response::unknown_command("foo").to_string(),
            "ERROR:Unknown command 'foo'\n"
        );
    }

    #[test]
    fn alarm_args_full() {
        let Command::ForbiddenAlarm(args) =
            Command::parse("forbidden_alarm:firefox|Reddit - Mozilla|Get back to work").unwrap()
        else {
            panic!("wrong command")
        };
        assert_eq!(args.window_class, "firefox");
        assert_eq!(args.window_title, "Reddit - Mozilla");
        assert_eq!(args.message, "Get back to work");
    }

    #[test]
    fn alarm_args_partial_and_missing() {
        let args = AlarmArgs::parse(Some("firefox|Reddit"));
        assert_eq!(args.window_class, "firefox");
        assert_eq!(args.window_title, "Reddit");
        assert_eq!(args.message, DEFAULT_ALARM_MESSAGE);

        let args = AlarmArgs::parse(None);
        assert!(args.window_class.is_empty());
        assert_eq!(args.message, DEFAULT_ALARM_MESSAGE);
    }

    #[test]
    fn alarm_message_may_contain_pipes() {
        let args = AlarmArgs::parse(Some("a|b|stop | now"));
        assert_eq!(args.message, "stop | now");
    }

    #[test]
    fn response_wire_format() {
        assert_eq!(Response::Ok.to_string(), "OK\n");
        assert_eq!(
            Response::Payload("{\"ok\":true}".into()).to_string(),
            "OK:{\"ok\":true}\n"
        );
        assert_eq!(Response::Error("nope".into()).to_string(), "ERROR:nope\n");
    }

    #[test]
    fn display_round_trips_through_parse() {
        for cmd in [
            Command::Status,
            Command::ReloadConfig,
            Command::DismissAlarm,
            Command::ResetDeadline,
            Command::ToggleScreenSampling,
        ] {
            assert_eq!(Command::parse(&cmd.to_string()), Ok(cmd));
        }
    }
}
