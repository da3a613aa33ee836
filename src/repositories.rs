pub mod identity;
pub mod postgres;
pub mod referrals;
pub mod store;
pub mod users;
