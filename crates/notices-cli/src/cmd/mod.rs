pub mod config;
pub mod init;
pub mod plan;
pub mod run;
pub mod sheets;
pub mod watch;

/// Date letters are stamped with.
pub fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}
