pub mod reminder_task;
