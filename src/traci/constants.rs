//! TraCI command, variable and type identifiers.

// Commands
pub const CMD_GETVERSION: u8 = 0x00;
pub const CMD_LOAD: u8 = 0x01;
pub const CMD_SIMSTEP: u8 = 0x02;
pub const CMD_CLOSE: u8 = 0x7f;
pub const CMD_GET_VEHICLE_VARIABLE: u8 = 0xa4;
pub const CMD_SET_VEHICLE_VARIABLE: u8 = 0xc4;
pub const CMD_GET_SIM_VARIABLE: u8 = 0xab;

/// Responses to get commands carry the command ID plus this offset.
pub const RESPONSE_OFFSET: u8 = 0x10;

// Variables
pub const TRACI_ID_LIST: u8 = 0x00;
pub const VAR_SPEED: u8 = 0x40;
pub const VAR_POSITION: u8 = 0x42;
pub const VAR_SPEEDSETMODE: u8 = 0xb3;
pub const VAR_MIN_EXPECTED_VEHICLES: u8 = 0x7d;
pub const VAR_COLLIDING_VEHICLES_IDS: u8 = 0x80;

// Value types
pub const POSITION_2D: u8 = 0x01;
pub const TYPE_INTEGER: u8 = 0x09;
pub const TYPE_DOUBLE: u8 = 0x0b;
pub const TYPE_STRINGLIST: u8 = 0x0e;

// Status results
pub const RTYPE_OK: u8 = 0x00;
pub const RTYPE_NOTIMPLEMENTED: u8 = 0x01;
pub const RTYPE_ERR: u8 = 0xff;
