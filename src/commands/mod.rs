//! This module aggregates all the command modules for the bot.

use crate::{Data, Error};

/// General purpose commands (help, register).
pub mod general;
/// Music playback commands and the player machinery behind them.
pub mod music;

/// Every command the framework registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    use general::{help, register};
    use music::{
        announce::announce,
        autoplay::autoplay,
        favorites::{favorite, favorites},
        pause::pause,
        play::play,
        queue::queue,
        request_channel::request_channel,
        requeue::requeue,
        skip::skip,
        stop::stop,
        volume::volume,
    };

    vec![
        register(),
        help(),
        play(),
        skip(),
        pause(),
        stop(),
        queue(),
        volume(),
        requeue(),
        autoplay(),
        announce(),
        favorite(),
        favorites(),
        request_channel(),
    ]
}
