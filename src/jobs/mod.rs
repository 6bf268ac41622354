pub mod borrow_monitor;
