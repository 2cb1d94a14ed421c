use actix_web::{get, web};

use crate::middleware::auth::AuthenticatedUser;
use crate::models::User;

#[get("/me")]
pub async fn me(authenticated_user: AuthenticatedUser) -> web::Json<User> {
    web::Json(authenticated_user.user)
}
