pub mod account;
pub mod audit;
pub mod password;
pub mod validation;

pub use account::AccountService;
