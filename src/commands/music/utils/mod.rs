// Export music utilities
pub mod autoplay_manager;
pub mod broadcaster;
pub mod button_controls;
pub mod component_handlers;
pub mod embedded_messages;
pub mod event_handlers;
pub mod guild_state;
pub mod history_store;
pub mod music_manager;
