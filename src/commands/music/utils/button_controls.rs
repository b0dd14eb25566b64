use serenity::all::{ButtonStyle, CreateActionRow, CreateButton, ReactionType};

/// Prefix shared by every player-control button id.
pub const PLAYER_PREFIX: &str = "player:";
/// Prefix shared by the queue pagination buttons.
pub const QUEUE_PAGE_PREFIX: &str = "queue:";

/// A player-control button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerButton {
    Previous,
    Pause,
    Resume,
    Skip,
    Stop,
    Queue,
}

impl PlayerButton {
    pub fn custom_id(self) -> &'static str {
        match self {
            PlayerButton::Previous => "player:previous",
            PlayerButton::Pause => "player:pause",
            PlayerButton::Resume => "player:resume",
            PlayerButton::Skip => "player:skip",
            PlayerButton::Stop => "player:stop",
            PlayerButton::Queue => "player:queue",
        }
    }

    pub fn parse(custom_id: &str) -> Option<Self> {
        [
            PlayerButton::Previous,
            PlayerButton::Pause,
            PlayerButton::Resume,
            PlayerButton::Skip,
            PlayerButton::Stop,
            PlayerButton::Queue,
        ]
        .into_iter()
        .find(|button| button.custom_id() == custom_id)
    }
}

fn button(kind: PlayerButton, emoji: &str, label: &str, style: ButtonStyle) -> CreateButton {
    CreateButton::new(kind.custom_id())
        .emoji(ReactionType::Unicode(emoji.to_string()))
        .style(style)
        .label(label)
}

/// Creates the player control row. The middle button resumes when `paused`, pauses otherwise.
pub fn player_buttons(paused: bool) -> Vec<CreateActionRow> {
    let play_pause = if paused {
        button(PlayerButton::Resume, "▶️", "Resume", ButtonStyle::Success)
    } else {
        button(PlayerButton::Pause, "⏸️", "Pause", ButtonStyle::Primary)
    };

    vec![CreateActionRow::Buttons(vec![
        button(PlayerButton::Previous, "⏮️", "Restart", ButtonStyle::Secondary),
        play_pause,
        button(PlayerButton::Skip, "⏭️", "Skip", ButtonStyle::Secondary),
        button(PlayerButton::Stop, "⏹️", "Stop", ButtonStyle::Danger),
        button(PlayerButton::Queue, "📋", "Queue", ButtonStyle::Secondary),
    ])]
}

/// A pagination request decoded from a `queue:prev:N` / `queue:next:N` id.
/// The value is the zero-based page to show.
pub fn parse_queue_page(custom_id: &str) -> Option<usize> {
    let rest = custom_id.strip_prefix(QUEUE_PAGE_PREFIX)?;
    let (direction, page) = rest.split_once(':')?;
    let page: usize = page.parse().ok()?;
    match direction {
        "prev" => Some(page.saturating_sub(1)),
        "next" => Some(page + 1),
        _ => None,
    }
}

/// Previous/next buttons for a paged queue view showing zero-based `page`.
pub fn queue_page_buttons(page: usize, total_pages: usize) -> Vec<CreateActionRow> {
    if total_pages <= 1 {
        return Vec::new();
    }

    let previous = CreateButton::new(format!("{QUEUE_PAGE_PREFIX}prev:{page}"))
        .emoji(ReactionType::Unicode("◀️".to_string()))
        .style(ButtonStyle::Secondary)
        .disabled(page == 0);
    let next = CreateButton::new(format!("{QUEUE_PAGE_PREFIX}next:{page}"))
        .emoji(ReactionType::Unicode("▶️".to_string()))
        .style(ButtonStyle::Secondary)
        .disabled(page + 1 >= total_pages);

    vec![CreateActionRow::Buttons(vec![previous, next])]
}
