pub mod clock;
pub mod temp_avatar;
pub mod worker;
