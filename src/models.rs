pub mod referrals;
pub mod users;
