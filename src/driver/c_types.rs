//! Memory layout of the structures exchanged with the ASAP3 library.
//!
//! `CANapAPI.h` is compiled with 1 byte packing, so every structure here is `packed`.
//! Fields of packed structures must be copied out before use, never borrowed.

#![allow(non_camel_case_types, non_snake_case, dead_code)]

use std::os::raw::{c_char, c_double, c_int, c_short, c_uint, c_ushort, c_void};

use crate::constants::{MAX_OS_VERSION, MAX_PATH};

/// Windows `unsigned long`, 32 bits on every Windows target
pub type ULONG = u32;
/// Windows `long`
pub type LONG = i32;

/// `TAsap3Hdl`
pub type TAsap3Hdl = *mut c_void;
/// `TModulHdl`
pub type TModulHdl = c_ushort;
/// `TRecorderID`
pub type TRecorderID = *mut c_void;
/// `TScriptHdl`
pub type TScriptHdl = ULONG;
/// `TTime`, ticks of 10 µs
pub type TTime = ULONG;
/// Windows `BOOL`
pub type BOOL = c_int;

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct version_t {
    pub dllMainVersion: c_int,
    pub dllSubVersion: c_int,
    pub dllRelease: c_int,
    pub osVersion: [c_char; MAX_OS_VERSION],
    pub osRelease: c_int,
}

impl Default for version_t {
    fn default() -> Self {
        Self { dllMainVersion: 0, dllSubVersion: 0, dllRelease: 0, osVersion: [0; MAX_OS_VERSION], osRelease: 0 }
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct Appversion {
    pub MainVersion: c_int,
    pub SubVersion: c_int,
    pub ServicePack: c_int,
    pub Application: [c_char; 30],
}

impl Default for Appversion {
    fn default() -> Self {
        Self { MainVersion: 0, SubVersion: 0, ServicePack: 0, Application: [0; 30] }
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct DBObjectInfo {
    pub DBObjecttype: c_uint,
    pub type_: c_uint,
    pub min: c_double,
    pub max: c_double,
    pub minEx: c_double,
    pub maxEx: c_double,
    pub precision: u8,
    pub unit: [c_char; MAX_PATH],
}

impl Default for DBObjectInfo {
    fn default() -> Self {
        Self {
            DBObjecttype: 0,
            type_: 0,
            min: 0.0,
            max: 0.0,
            minEx: 0.0,
            maxEx: 0.0,
            precision: 0,
            unit: [0; MAX_PATH],
        }
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct DBFileInfo {
    pub asap2Fname: [c_char; MAX_PATH],
    pub asap2Path: [c_char; MAX_PATH],
    pub type_: u8,
}

impl Default for DBFileInfo {
    fn default() -> Self {
        Self { asap2Fname: [0; MAX_PATH], asap2Path: [0; MAX_PATH], type_: 0 }
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct TTaskInfo2 {
    pub description: *mut c_char,
    pub taskId: c_ushort,
    pub taskCycle: ULONG,
    pub eventChannel: ULONG,
}

impl Default for TTaskInfo2 {
    fn default() -> Self {
        Self { description: std::ptr::null_mut(), taskId: 0, taskCycle: 0, eventChannel: 0 }
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct TMeasurementListEntry {
    pub taskId: c_ushort,
    pub rate: ULONG,
    pub SaveFlag: BOOL,
    pub Disabled: BOOL,
    pub ObjectName: *mut c_char,
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct TMeasurementListEntries {
    pub ItemCount: c_uint,
    pub Entries: *mut *mut TMeasurementListEntry,
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct TValue {
    pub type_: c_uint,
    pub value: c_double,
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct TAxis {
    pub type_: c_uint,
    pub dimension: c_short,
    pub axis: *mut c_double,
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct TAscii {
    pub type_: c_uint,
    pub len: c_short,
    pub ascii: *mut c_char,
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct TCurve {
    pub type_: c_uint,
    pub dimension: c_short,
    pub axis: *mut c_double,
    pub values: *mut c_double,
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct TMap {
    pub type_: c_uint,
    pub xDimension: c_short,
    pub yDimension: c_short,
    pub xAxis: *mut c_double,
    pub yAxis: *mut c_double,
    pub values: *mut c_double,
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct TValBlk {
    pub type_: c_uint,
    pub xDimension: c_short,
    pub yDimension: c_short,
    pub values: *mut c_double,
}

/// `TCalibrationObjectValue`. The leading `type_` of every variant selects the active one
#[repr(C, packed)]
#[derive(Copy, Clone)]
pub union TCalibrationObjectValue {
    pub type_: c_uint,
    pub value: TValue,
    pub axis: TAxis,
    pub ascii: TAscii,
    pub curve: TCurve,
    pub map: TMap,
    pub valblk: TValBlk,
}

impl Default for TCalibrationObjectValue {
    fn default() -> Self {
        Self {
            map: TMap {
                type_: 0,
                xDimension: 0,
                yDimension: 0,
                xAxis: std::ptr::null_mut(),
                yAxis: std::ptr::null_mut(),
                values: std::ptr::null_mut(),
            },
        }
    }
}

/// Callback signature of `Asap3RegisterCallBack`
pub type EVENT_CALLBACK = unsafe extern "system" fn(hdl: TAsap3Hdl, private_data: ULONG) -> LONG;

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    fn packed_sizes() {
        assert_eq!(size_of::<version_t>(), 3 * 4 + MAX_OS_VERSION + 4);
        assert_eq!(size_of::<Appversion>(), 3 * 4 + 30);
        assert_eq!(size_of::<DBFileInfo>(), 2 * MAX_PATH + 1);
        assert_eq!(size_of::<DBObjectInfo>(), 2 * size_of::<c_uint>() + 4 * 8 + 1 + MAX_PATH);
        assert_eq!(size_of::<TValue>(), size_of::<c_uint>() + 8);
        assert_eq!(size_of::<TCalibrationObjectValue>(), size_of::<TMap>());
    }
}
