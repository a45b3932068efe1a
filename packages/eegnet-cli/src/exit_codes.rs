pub const SUCCESS: i32 = 0;
/// Bad arguments, missing or malformed input files
pub const INPUT_ERROR: i32 = 1;
pub const EXECUTION_ERROR: i32 = 2;
/// Pipeline configuration does not match the one recorded with an artifact
pub const PARITY_ERROR: i32 = 3;
