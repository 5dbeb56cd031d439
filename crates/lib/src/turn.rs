//! Turn creation for a resolved channel and user.

use crate::error::CallbackError;
use crate::store::{CallbackStore, ChannelRecord, TurnId, UserRecord};

/// Create a turn linking the channel's bot, the channel, and the user.
pub async fn create_turn(
    store: &dyn CallbackStore,
    channel: &ChannelRecord,
    user: &UserRecord,
) -> Result<TurnId, CallbackError> {
    let turn_id = store
        .create_turn(&channel.bot_id, &channel.id, &user.id)
        .await?;
    log::debug!(
        "created turn {} (bot {}, channel {}, user {})",
        turn_id,
        channel.bot_id,
        channel.id,
        user.id
    );
    Ok(turn_id)
}
