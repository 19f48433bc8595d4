pub mod http_trigger;
