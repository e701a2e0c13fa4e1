/// Rouse Crypto Library
///
/// Session tokens are 256 bits from the OS CSPRNG, URL-safe base64 encoded.
/// Passwords are hashed with Argon2id and stored in PHC string format.
pub mod password;
pub mod token;
