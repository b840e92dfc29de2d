pub mod entitlement;
pub mod google_login;
pub mod login;
pub mod otp;
pub mod register;
pub mod style_image;
pub mod verify_email;

#[cfg(test)]
pub(crate) mod test_support;
