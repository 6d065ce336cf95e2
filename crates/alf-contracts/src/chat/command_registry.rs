use super::intent_parser::Action;

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: Action,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "pick",
        action: Action::Pick,
    },
    CommandSpec {
        command: "key",
        action: Action::SetApiKey,
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "save",
    action: Action::Save,
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "solo",
        action: Action::Solo,
    },
    CommandSpec {
        command: "friends",
        action: Action::Friends,
    },
    CommandSpec {
        command: "back",
        action: Action::Back,
    },
    CommandSpec {
        command: "refs",
        action: Action::ShowReferences,
    },
    CommandSpec {
        command: "reload",
        action: Action::ReloadReferences,
    },
    CommandSpec {
        command: "generate",
        action: Action::Generate,
    },
    CommandSpec {
        command: "result",
        action: Action::ShowResult,
    },
    CommandSpec {
        command: "another",
        action: Action::Another,
    },
    CommandSpec {
        command: "new",
        action: Action::NewSession,
    },
    CommandSpec {
        command: "clear",
        action: Action::Clear,
    },
    CommandSpec {
        command: "history",
        action: Action::History,
    },
    CommandSpec {
        command: "help",
        action: Action::Help,
    },
    CommandSpec {
        command: "quit",
        action: Action::Quit,
    },
    CommandSpec {
        command: "exit",
        action: Action::Quit,
    },
];

pub const CHAT_HELP_COMMANDS: &[(&str, &str)] = &[
    ("/solo", "summon ALF on his own"),
    ("/friends", "open the friends menu"),
    ("/pick <id|n>", "choose a friend by id or menu number"),
    ("/back", "return to the previous menu"),
    ("/refs", "list cached reference images"),
    ("/reload", "reload reference images from disk"),
    ("/generate", "generate from the current prompt"),
    ("/key <api key>", "set the API key for this session"),
    ("/result", "show the latest result"),
    ("/save [path]", "write the latest image as PNG"),
    ("/another", "write a new prompt for the same theme"),
    ("/new", "clear the session and go home"),
    ("/clear", "clear the session and stay here"),
    ("/history", "list recent generations"),
    ("/help", "show this list"),
    ("/quit", "leave the studio"),
];
