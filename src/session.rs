/// Backend auth token of the signed-in admin.
pub const AUTH_TOKEN: &str = "auth_token";
