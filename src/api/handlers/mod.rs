pub mod health;
pub mod temp_avatars;
