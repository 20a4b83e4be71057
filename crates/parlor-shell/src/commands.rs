/// One line of shell input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Text for the current target.
    Say(String),
    /// Set (`Some`) or clear (`None`) the current target.
    Target(Option<String>),
    Whisper { to: String, text: String },
    AddContact(String),
    Contacts,
    Refresh,
    Help,
    Quit,
    Empty,
    /// Known command with missing arguments; carries the usage line.
    Usage(&'static str),
    Unknown(String),
}

pub(crate) const HELP: &str = "\
commands:
  <text>             send to the current target (everyone when unset)
  /to NICK           send following lines privately to NICK
  /to                back to public (also /to all, /to public)
  /msg NICK TEXT     send one private message
  /add NICK          add NICK to contacts
  /contacts          list contacts
  /refresh           ask the server for the contact list
  /help              this text
  /quit              leave (also Ctrl-D)
  //text             send text starting with '/'";

pub(crate) fn parse(line: &str) -> Command {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Command::Empty;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Command::Say(line.to_owned());
    };
    if rest.starts_with('/') {
        return Command::Say(rest.to_owned());
    }

    let (name, args) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(name, args)| (name, args.trim()));

    match name {
        "to" => match args {
            "" | "all" | "public" => Command::Target(None),
            nick => Command::Target(Some(nick.to_owned())),
        },
        "msg" => match args.split_once(char::is_whitespace) {
            Some((to, text)) if !text.trim().is_empty() => Command::Whisper {
                to: to.to_owned(),
                text: text.trim_start().to_owned(),
            },
            _ => Command::Usage("/msg NICK TEXT"),
        },
        "add" if args.is_empty() => Command::Usage("/add NICK"),
        "add" => Command::AddContact(args.to_owned()),
        "contacts" => Command::Contacts,
        "refresh" => Command::Refresh,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent_as_is() {
        assert_eq!(parse("hello there\n"), Command::Say("hello there".into()));
        assert_eq!(parse("  padded  "), Command::Say("  padded  ".into()));
    }

    #[test]
    fn blank_lines_are_empty() {
        assert_eq!(parse("\n"), Command::Empty);
        assert_eq!(parse("   \r\n"), Command::Empty);
    }

    #[test]
    fn target_set_and_cleared() {
        assert_eq!(parse("/to bob"), Command::Target(Some("bob".into())));
        assert_eq!(parse("/to"), Command::Target(None));
        assert_eq!(parse("/to all"), Command::Target(None));
        assert_eq!(parse("/to   public  "), Command::Target(None));
    }

    #[test]
    fn one_off_private_message() {
        assert_eq!(
            parse("/msg bob see you at 5"),
            Command::Whisper {
                to: "bob".into(),
                text: "see you at 5".into()
            }
        );
        assert_eq!(parse("/msg bob"), Command::Usage("/msg NICK TEXT"));
        assert_eq!(parse("/msg"), Command::Usage("/msg NICK TEXT"));
    }

    #[test]
    fn roster_commands() {
        assert_eq!(parse("/add carol"), Command::AddContact("carol".into()));
        assert_eq!(parse("/add"), Command::Usage("/add NICK"));
        assert_eq!(parse("/contacts"), Command::Contacts);
        assert_eq!(parse("/refresh"), Command::Refresh);
    }

    #[test]
    fn control_commands() {
        assert_eq!(parse("/help"), Command::Help);
        assert_eq!(parse("/quit"), Command::Quit);
        assert_eq!(parse("/exit"), Command::Quit);
        assert_eq!(parse("/dance"), Command::Unknown("dance".into()));
    }

    #[test]
    fn double_slash_escapes_a_leading_slash() {
        assert_eq!(parse("//shrug"), Command::Say("/shrug".into()));
    }
}
