pub mod csv_output_adapter;
pub mod in_memory_sheet;
pub mod sheets_http;
