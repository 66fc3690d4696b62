use axum::{debug_handler, response::Redirect};
use tower_sessions::Session;
use tracing::debug;

use crate::AppResult;

#[debug_handler]
pub(crate) async fn logout(
    session: Session
) -> AppResult<Redirect> {
    if let Some(user_id) = session.get::<String>(crate::session::USER_ID).await? {
        debug!("u/{user_id} signed out");
    }
    session.flush().await?;
    Ok(Redirect::to("/auth"))
}
