pub mod key_cache;
pub mod key_rotation;
pub mod pass_service;
pub mod startup_guard;
pub mod token_signer;
pub mod token_validator;
