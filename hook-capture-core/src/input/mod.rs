pub mod hook_feed;
