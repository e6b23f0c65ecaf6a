pub const COMMAND_PREFIX: char = '/';

const TOPIC_PLACEHOLDER: &str = "{topic}";

const TEACH_TEMPLATE: &str = "I want to learn about the following topic: {topic}

Using the sources in this notebook, teach it to me as a short lesson with these sections:

## Overview
Explain what it is and why it matters in two or three sentences.

## Key Concepts
List the core ideas I need to understand, each with a one-line explanation.

## Worked Example
Walk through one concrete example step by step, citing the sources you rely on.

## Common Pitfalls
Point out the mistakes people usually make and how to avoid them.

## Check Your Understanding
Finish with three short questions I can answer to test myself. Do not include the answers.";

const TEACH_USAGE: &str = "Usage: /teach <topic>\n\nGive me a topic and I'll turn it into a structured lesson based on your sources, for example `/teach binary search`.";

pub const COMMANDS: &[(&str, &str)] = &[
    ("/new", "Start a new chat. The current conversation can be brought back with /restore."),
    ("/restore", "Restore the conversation cleared by the last /new."),
    ("/teach <topic>", "Get a structured lesson on a topic from your sources."),
    ("/help", "Show this list of commands."),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New,
    Restore,
    Teach(String),
    Help,
    Unknown(String),
    Passthrough(String),
}

/// What the store has to do for a parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Clear the local transcript and ask the server to reset it.
    ResetTranscript,
    /// Ask the server to undo the last reset, then refetch.
    RestoreTranscript,
    /// Append an ephemeral assistant message; nothing reaches the server.
    LocalReply(String),
    /// Send `outgoing` to the backend while showing `display` locally.
    Submit { display: String, outgoing: String },
}

pub fn parse(raw: &str) -> Command {
    let text = raw.trim();
    let Some(rest) = text.strip_prefix(COMMAND_PREFIX) else {
        return Command::Passthrough(text.to_string());
    };

    let (name, argument) = match rest.find(char::is_whitespace) {
        Some(split) => (&rest[..split], rest[split..].trim()),
        None => (rest, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "new" => Command::New,
        "restore" => Command::Restore,
        "teach" => Command::Teach(argument.to_string()),
        "help" => Command::Help,
        _ => Command::Unknown(name.to_string()),
    }
}

pub fn interpret(command: &Command) -> CommandAction {
    match command {
        Command::New => CommandAction::ResetTranscript,
        Command::Restore => CommandAction::RestoreTranscript,
        Command::Teach(topic) if topic.is_empty() => {
            CommandAction::LocalReply(TEACH_USAGE.to_string())
        }
        Command::Teach(topic) => CommandAction::Submit {
            display: topic.clone(),
            outgoing: teach_prompt(topic),
        },
        Command::Help => CommandAction::LocalReply(help_text()),
        Command::Unknown(name) => CommandAction::LocalReply(format!(
            "Unknown command: /{name}. Type /help to see available commands."
        )),
        Command::Passthrough(text) => CommandAction::Submit {
            display: text.clone(),
            outgoing: text.clone(),
        },
    }
}

pub fn teach_prompt(topic: &str) -> String {
    TEACH_TEMPLATE.replacen(TOPIC_PLACEHOLDER, topic, 1)
}

pub fn help_text() -> String {
    let mut out = String::from("Available commands:\n");
    for (usage, description) in COMMANDS {
        out.push_str(&format!("\n{usage} - {description}"));
    }
    out
}
