use super::command_registry::{
    CommandSpec, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SINGLE_PATH_COMMANDS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Noop,
    SetPrompt,
    Solo,
    Friends,
    Back,
    Pick,
    ShowReferences,
    ReloadReferences,
    Generate,
    SetApiKey,
    ShowResult,
    Save,
    Another,
    NewSession,
    Clear,
    History,
    Help,
    Quit,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub action: Action,
    pub raw: String,
    pub prompt: Option<String>,
    /// Argument for `/pick`, `/key` and `/save`; the command name for unknown
    /// slash commands.
    pub arg: Option<String>,
}

impl Intent {
    fn new(action: Action, raw: &str) -> Self {
        Self {
            action,
            raw: raw.to_string(),
            prompt: None,
            arg: None,
        }
    }

    fn with_arg(mut self, arg: &str) -> Self {
        if !arg.is_empty() {
            self.arg = Some(arg.to_string());
        }
        self
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<Action> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_single_path_arg(arg: &str) -> String {
    if arg.trim().is_empty() {
        return String::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Err(_) => arg.trim().to_string(),
    }
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new(Action::Noop, text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                return Intent::new(action, text).with_arg(arg);
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                return Intent::new(action, text).with_arg(&parse_single_path_arg(arg));
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            return Intent::new(Action::Unknown, text).with_arg(&command);
        }
    }

    let mut intent = Intent::new(Action::SetPrompt, text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}
