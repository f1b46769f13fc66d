//! Calibration and measurement objects of a module database
//!
//! [CalibrationObject] has one variant per value type. All variants share a
//! [BaseCalibrationObject] with the database information of the object, which is
//! reachable through `Deref`.
//!
//! Values are always read in physical representation. Writing reads the current
//! value first, replaces the written part and writes the whole object back under the
//! call lock of the driver. Arrays written must have the current dimension of the object.

use std::{ops::Deref, sync::Arc, sync::OnceLock};

use crate::{
    CanapeError, CanapeResult,
    canape::Session,
    constants::{DataType, Format, ObjectType, ValueType},
    driver::{CalibrationValue, ModuleHandle, ObjectInfo},
};

/// Database information and access shared by all calibration object types
#[derive(Debug)]
pub struct BaseCalibrationObject {
    session: Arc<Session>,
    module: ModuleHandle,
    name: String,
    info: ObjectInfo,
    value_type: ValueType,
    data_type: Option<DataType>,
    force_upload: bool,
    dimension: OnceLock<Vec<usize>>,
}

impl BaseCalibrationObject {
    /// Name of the object
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Measurement or calibration object
    pub fn object_type(&self) -> ObjectType {
        self.info.object_type
    }

    /// Value type of the object
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Data type, if CANape reported one
    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }

    /// Upper limit
    pub fn max(&self) -> f64 {
        self.info.max
    }

    /// Lower limit
    pub fn min(&self) -> f64 {
        self.info.min
    }

    /// Extended upper limit
    pub fn max_ex(&self) -> f64 {
        self.info.max_ex
    }

    /// Extended lower limit
    pub fn min_ex(&self) -> f64 {
        self.info.min_ex
    }

    /// Number of decimal places
    pub fn precision(&self) -> u8 {
        self.info.precision
    }

    /// Physical unit
    pub fn unit(&self) -> &str {
        &self.info.unit
    }

    /// If true (default), values are uploaded from the ECU on every read
    pub fn force_upload(&self) -> bool {
        self.force_upload
    }

    /// Sets [BaseCalibrationObject::force_upload]
    pub fn set_force_upload(&mut self, force_upload: bool) {
        self.force_upload = force_upload
    }

    /// Reads the current value
    pub fn read(&self) -> CanapeResult<CalibrationValue> {
        self.session.driver.read_calibration_object(
            self.session.hdl,
            self.module,
            &self.name,
            Format::PhysicalRepresentation,
            self.force_upload,
        )
    }

    /// Writes a complete value
    pub fn write(&self, value: &CalibrationValue) -> CanapeResult<()> {
        if self.info.object_type != ObjectType::Calibrate {
            return Err(CanapeError::NotWritable(self.name.clone()));
        }
        log::debug!("Writing {} = {value:?}", self.name);
        self.session
            .driver
            .write_calibration_object(self.session.hdl, self.module, &self.name, Format::PhysicalRepresentation, value)
    }

    /// Dimension of the value, read once
    fn dimension(&self) -> CanapeResult<&[usize]> {
        if let Some(d) = self.dimension.get() {
            return Ok(d);
        }
        let d = self.read()?.dimension();
        Ok(self.dimension.get_or_init(|| d))
    }

    fn dim(&self, idx: usize) -> CanapeResult<usize> {
        Ok(self.dimension()?.get(idx).copied().unwrap_or(0))
    }

    /// Reads the value, lets `update` replace a part of it and writes it back
    fn modify(&self, update: impl FnOnce(&mut CalibrationValue) -> CanapeResult<()>) -> CanapeResult<()> {
        if self.info.object_type != ObjectType::Calibrate {
            return Err(CanapeError::NotWritable(self.name.clone()));
        }
        let _guard = self.session.driver.call_lock().lock();
        let mut value = self.read()?;
        update(&mut value)?;
        self.write(&value)
    }

    fn unexpected(&self, value: &CalibrationValue) -> CanapeError {
        log::error!("{} returned a {} value, expected {}", self.name, value.value_type(), self.value_type);
        CanapeError::UnknownValueType {
            name: self.name.clone(),
            value_type: value.value_type() as u32,
        }
    }
}

fn check_len(expected: usize, new: &[f64]) -> CanapeResult<()> {
    if expected == new.len() {
        Ok(())
    } else {
        Err(CanapeError::DimensionMismatch { expected: vec![expected], actual: vec![new.len()] })
    }
}

fn check_rows(x: usize, y: usize, new: &[Vec<f64>]) -> CanapeResult<()> {
    if new.len() == x && new.iter().all(|row| row.len() == y) {
        Ok(())
    } else {
        Err(CanapeError::DimensionMismatch {
            expected: vec![x, y],
            actual: vec![new.len(), new.first().map(Vec::len).unwrap_or(0)],
        })
    }
}

macro_rules! calibration_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name(BaseCalibrationObject);

        impl Deref for $name {
            type Target = BaseCalibrationObject;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl $name {
            /// Sets [BaseCalibrationObject::force_upload]
            pub fn set_force_upload(&mut self, force_upload: bool) {
                self.0.set_force_upload(force_upload)
            }
        }
    };
}

calibration_type!(
    /// Scalar (0D) calibration object
    ScalarCalibrationObject
);
calibration_type!(
    /// Axis (1D) calibration object
    AxisCalibrationObject
);
calibration_type!(
    /// Curve calibration object
    CurveCalibrationObject
);
calibration_type!(
    /// Map calibration object
    MapCalibrationObject
);
calibration_type!(
    /// ASCII string calibration object
    AsciiCalibrationObject
);
calibration_type!(
    /// Value block calibration object
    ValueBlockCalibrationObject
);

impl ScalarCalibrationObject {
    /// Current value
    pub fn value(&self) -> CanapeResult<f64> {
        match self.read()? {
            CalibrationValue::Scalar(v) => Ok(v),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Writes a new value
    pub fn set_value(&self, new_value: f64) -> CanapeResult<()> {
        self.modify(|v| match v {
            CalibrationValue::Scalar(s) => {
                *s = new_value;
                Ok(())
            }
            other => Err(self.unexpected(other)),
        })
    }
}

impl AxisCalibrationObject {
    /// Number of axis points
    pub fn dimension(&self) -> CanapeResult<usize> {
        self.dim(0)
    }

    /// Axis points
    pub fn axis(&self) -> CanapeResult<Vec<f64>> {
        match self.read()? {
            CalibrationValue::Axis(a) => Ok(a),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Writes new axis points
    pub fn set_axis(&self, new_axis: &[f64]) -> CanapeResult<()> {
        self.modify(|v| match v {
            CalibrationValue::Axis(a) => {
                check_len(a.len(), new_axis)?;
                *a = new_axis.to_vec();
                Ok(())
            }
            other => Err(self.unexpected(other)),
        })
    }
}

impl CurveCalibrationObject {
    /// Number of curve points
    pub fn dimension(&self) -> CanapeResult<usize> {
        self.dim(0)
    }

    fn read_curve(&self) -> CanapeResult<(Vec<f64>, Vec<f64>)> {
        match self.read()? {
            CalibrationValue::Curve { axis, values } => Ok((axis, values)),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Axis points
    pub fn axis(&self) -> CanapeResult<Vec<f64>> {
        Ok(self.read_curve()?.0)
    }

    /// Writes new axis points
    pub fn set_axis(&self, new_axis: &[f64]) -> CanapeResult<()> {
        self.modify(|v| match v {
            CalibrationValue::Curve { axis, .. } => {
                check_len(axis.len(), new_axis)?;
                *axis = new_axis.to_vec();
                Ok(())
            }
            other => Err(self.unexpected(other)),
        })
    }

    /// Curve values
    pub fn values(&self) -> CanapeResult<Vec<f64>> {
        Ok(self.read_curve()?.1)
    }

    /// Writes new curve values
    pub fn set_values(&self, new_values: &[f64]) -> CanapeResult<()> {
        self.modify(|v| match v {
            CalibrationValue::Curve { values, .. } => {
                check_len(values.len(), new_values)?;
                *values = new_values.to_vec();
                Ok(())
            }
            other => Err(self.unexpected(other)),
        })
    }
}

impl MapCalibrationObject {
    /// Number of X axis points
    pub fn x_dimension(&self) -> CanapeResult<usize> {
        self.dim(0)
    }

    /// Number of Y axis points
    pub fn y_dimension(&self) -> CanapeResult<usize> {
        self.dim(1)
    }

    fn read_map(&self) -> CanapeResult<(Vec<f64>, Vec<f64>, Vec<Vec<f64>>)> {
        match self.read()? {
            CalibrationValue::Map { x_axis, y_axis, values } => Ok((x_axis, y_axis, values)),
            other => Err(self.unexpected(&other)),
        }
    }

    /// X axis points
    pub fn x_axis(&self) -> CanapeResult<Vec<f64>> {
        Ok(self.read_map()?.0)
    }

    /// Writes new X axis points
    pub fn set_x_axis(&self, new_x_axis: &[f64]) -> CanapeResult<()> {
        self.modify(|v| match v {
            CalibrationValue::Map { x_axis, .. } => {
                check_len(x_axis.len(), new_x_axis)?;
                *x_axis = new_x_axis.to_vec();
                Ok(())
            }
            other => Err(self.unexpected(other)),
        })
    }

    /// Y axis points
    pub fn y_axis(&self) -> CanapeResult<Vec<f64>> {
        Ok(self.read_map()?.1)
    }

    /// Writes new Y axis points
    pub fn set_y_axis(&self, new_y_axis: &[f64]) -> CanapeResult<()> {
        self.modify(|v| match v {
            CalibrationValue::Map { y_axis, .. } => {
                check_len(y_axis.len(), new_y_axis)?;
                *y_axis = new_y_axis.to_vec();
                Ok(())
            }
            other => Err(self.unexpected(other)),
        })
    }

    /// Map values, `values[x][y]`. Maps stored as value blocks are returned the same way
    pub fn values(&self) -> CanapeResult<Vec<Vec<f64>>> {
        match self.read()? {
            CalibrationValue::Map { values, .. } | CalibrationValue::ValueBlock { values } => Ok(values),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Writes new map values, `values[x][y]`
    pub fn set_values(&self, new_values: &[Vec<f64>]) -> CanapeResult<()> {
        self.modify(|v| {
            let dims = v.dimension();
            match v {
                CalibrationValue::Map { values, .. } | CalibrationValue::ValueBlock { values } => {
                    check_rows(dims[0], dims[1], new_values)?;
                    *values = new_values.to_vec();
                    Ok(())
                }
                other => Err(self.unexpected(other)),
            }
        })
    }
}

impl AsciiCalibrationObject {
    /// Capacity of the string in characters
    pub fn len(&self) -> CanapeResult<usize> {
        self.dim(0)
    }

    /// True if the string has no characters
    pub fn is_empty(&self) -> CanapeResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Current string
    pub fn ascii(&self) -> CanapeResult<String> {
        match self.read()? {
            CalibrationValue::Ascii { text, .. } => Ok(text),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Writes a new string. It must fit the capacity of the object
    pub fn set_ascii(&self, new_ascii: &str) -> CanapeResult<()> {
        let max = self.len()?;
        self.modify(|v| match v {
            CalibrationValue::Ascii { text, .. } => {
                let len = new_ascii.chars().count();
                if len > max {
                    return Err(CanapeError::DimensionMismatch { expected: vec![max], actual: vec![len] });
                }
                *text = new_ascii.to_string();
                Ok(())
            }
            other => Err(self.unexpected(other)),
        })
    }
}

impl ValueBlockCalibrationObject {
    /// Number of values in X direction
    pub fn x_dimension(&self) -> CanapeResult<usize> {
        self.dim(0)
    }

    /// Number of values in Y direction
    pub fn y_dimension(&self) -> CanapeResult<usize> {
        self.dim(1)
    }

    /// Block values, `values[x][y]`. One dimensional blocks have one value per row
    pub fn values(&self) -> CanapeResult<Vec<Vec<f64>>> {
        match self.read()? {
            CalibrationValue::ValueBlock { values } => Ok(values),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Writes new block values, `values[x][y]`
    pub fn set_values(&self, new_values: &[Vec<f64>]) -> CanapeResult<()> {
        self.modify(|v| {
            let dims = v.dimension();
            match v {
                CalibrationValue::ValueBlock { values } => {
                    check_rows(dims[0], dims[1], new_values)?;
                    *values = new_values.to_vec();
                    Ok(())
                }
                other => Err(self.unexpected(other)),
            }
        })
    }
}

/// Object of a module database, by value type
#[derive(Debug)]
pub enum CalibrationObject {
    /// Scalar value
    Scalar(ScalarCalibrationObject),
    /// Axis
    Axis(AxisCalibrationObject),
    /// Curve
    Curve(CurveCalibrationObject),
    /// Map
    Map(MapCalibrationObject),
    /// ASCII string
    Ascii(AsciiCalibrationObject),
    /// Value block
    ValueBlock(ValueBlockCalibrationObject),
}

impl CalibrationObject {
    /// Looks up `name` in the database and creates the object for its value type
    pub(crate) fn new(session: Arc<Session>, module: ModuleHandle, name: &str) -> CanapeResult<Self> {
        let info = session
            .driver
            .get_db_object_info(session.hdl, module, name)
            .map_err(|e| match e {
                CanapeError::Api { .. } => CanapeError::UnknownObject(name.to_string()),
                other => other,
            })?;
        let value_type = ValueType::from_repr(info.value_type).ok_or_else(|| CanapeError::UnknownValueType {
            name: name.to_string(),
            value_type: info.value_type,
        })?;
        let data_type = match session
            .driver
            .read_object_parameter(session.hdl, module, name, Format::PhysicalRepresentation)
        {
            Ok(p) => Some(p.data_type),
            Err(e) => {
                log::debug!("No data type for {name}: {e}");
                None
            }
        };
        let base = BaseCalibrationObject {
            session,
            module,
            name: name.to_string(),
            info,
            value_type,
            data_type,
            force_upload: true,
            dimension: OnceLock::new(),
        };
        Ok(match value_type {
            ValueType::Value => Self::Scalar(ScalarCalibrationObject(base)),
            ValueType::Axis => Self::Axis(AxisCalibrationObject(base)),
            ValueType::Curve => Self::Curve(CurveCalibrationObject(base)),
            ValueType::Map => Self::Map(MapCalibrationObject(base)),
            ValueType::Ascii => Self::Ascii(AsciiCalibrationObject(base)),
            ValueType::ValBlk => Self::ValueBlock(ValueBlockCalibrationObject(base)),
        })
    }

    /// Shared part of the object
    pub fn base(&self) -> &BaseCalibrationObject {
        match self {
            Self::Scalar(o) => &o.0,
            Self::Axis(o) => &o.0,
            Self::Curve(o) => &o.0,
            Self::Map(o) => &o.0,
            Self::Ascii(o) => &o.0,
            Self::ValueBlock(o) => &o.0,
        }
    }

    fn base_mut(&mut self) -> &mut BaseCalibrationObject {
        match self {
            Self::Scalar(o) => &mut o.0,
            Self::Axis(o) => &mut o.0,
            Self::Curve(o) => &mut o.0,
            Self::Map(o) => &mut o.0,
            Self::Ascii(o) => &mut o.0,
            Self::ValueBlock(o) => &mut o.0,
        }
    }

    /// Name of the object
    pub fn name(&self) -> &str {
        self.base().name()
    }

    /// Sets [BaseCalibrationObject::force_upload]
    pub fn set_force_upload(&mut self, force_upload: bool) {
        self.base_mut().set_force_upload(force_upload)
    }

    /// Reads the complete value
    pub fn value(&self) -> CanapeResult<CalibrationValue> {
        self.base().read()
    }

    /// Writes a complete value. It must have the value type and dimension of the object
    pub fn set_value(&self, value: &CalibrationValue) -> CanapeResult<()> {
        let base = self.base();
        base.modify(|current| {
            if current.value_type() != value.value_type() {
                return Err(base.unexpected(value));
            }
            if !current.accepts(value) {
                return Err(CanapeError::DimensionMismatch { expected: current.dimension(), actual: value.dimension() });
            }
            current.replace(value);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        canape::{Canape, CanapeOptions},
        driver::{SimulatedCanape, to_rows},
        module::Module,
    };

    fn setup() -> (Arc<SimulatedCanape>, Canape, Module) {
        let sim = Arc::new(SimulatedCanape::new());
        let canape = Canape::new(sim.clone(), CanapeOptions::new("demo")).unwrap();
        let m = sim.add_module("XCPsim", "XCPsim.a2l");
        sim.add_calibration(m, "ampl", CalibrationValue::Scalar(1.5), "V");
        sim.add_calibration(
            m,
            "curve1",
            CalibrationValue::Curve { axis: vec![0.0, 1.0, 2.0], values: vec![10.0, 20.0, 30.0] },
            "",
        );
        sim.add_calibration(
            m,
            "map1",
            CalibrationValue::Map {
                x_axis: vec![0.0, 1.0],
                y_axis: vec![0.0, 1.0, 2.0],
                values: to_rows(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3),
            },
            "",
        );
        sim.add_calibration(m, "text", CalibrationValue::ascii("hello"), "");
        sim.add_calibration(m, "block", CalibrationValue::ValueBlock { values: to_rows(&[1.0, 2.0, 3.0], 3, 1) }, "");
        sim.add_measurement(m, "channel1", "V");
        let module = canape.get_module_by_name("XCPsim").unwrap();
        (sim, canape, module)
    }

    #[test]
    fn scalar_read_write() {
        let (sim, _canape, module) = setup();
        let CalibrationObject::Scalar(ampl) = module.get_calibration_object("ampl").unwrap() else {
            panic!("ampl is not a scalar")
        };
        assert_eq!(ampl.value().unwrap(), 1.5);
        assert_eq!(ampl.unit(), "V");
        assert_eq!(ampl.data_type(), Some(DataType::Float));
        assert!(ampl.force_upload());
        ampl.set_value(2.5).unwrap();
        assert_eq!(sim.object_value(module.handle(), "ampl"), Some(CalibrationValue::Scalar(2.5)));
    }

    #[test]
    fn curve_dimension_is_checked() {
        let (_sim, _canape, module) = setup();
        let CalibrationObject::Curve(curve) = module.get_calibration_object("curve1").unwrap() else {
            panic!("curve1 is not a curve")
        };
        assert_eq!(curve.dimension().unwrap(), 3);
        curve.set_values(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(curve.values().unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(curve.axis().unwrap(), vec![0.0, 1.0, 2.0]);
        assert!(matches!(
            curve.set_values(&[1.0]),
            Err(CanapeError::DimensionMismatch { expected, actual }) if expected == vec![3] && actual == vec![1]
        ));
    }

    #[test]
    fn map_values_are_x_major() {
        let (_sim, _canape, module) = setup();
        let CalibrationObject::Map(map) = module.get_calibration_object("map1").unwrap() else {
            panic!("map1 is not a map")
        };
        assert_eq!((map.x_dimension().unwrap(), map.y_dimension().unwrap()), (2, 3));
        assert_eq!(map.values().unwrap()[1], vec![4.0, 5.0, 6.0]);
        map.set_values(&[vec![0.0; 3], vec![1.0; 3]]).unwrap();
        assert_eq!(map.values().unwrap()[1], vec![1.0; 3]);
        assert!(map.set_values(&[vec![0.0; 2], vec![1.0; 2]]).is_err());
        map.set_y_axis(&[5.0, 6.0, 7.0]).unwrap();
        assert_eq!(map.y_axis().unwrap(), vec![5.0, 6.0, 7.0]);
    }

    #[test]
    fn ascii_and_value_block() {
        let (_sim, _canape, module) = setup();
        let CalibrationObject::Ascii(text) = module.get_calibration_object("text").unwrap() else {
            panic!("text is not ASCII")
        };
        assert_eq!(text.len().unwrap(), 5);
        text.set_ascii("hi").unwrap();
        assert_eq!(text.ascii().unwrap(), "hi");
        assert!(text.set_ascii("too long").is_err());

        let CalibrationObject::ValueBlock(block) = module.get_calibration_object("block").unwrap() else {
            panic!("block is not a value block")
        };
        assert_eq!((block.x_dimension().unwrap(), block.y_dimension().unwrap()), (3, 1));
        assert_eq!(block.values().unwrap(), vec![vec![1.0], vec![2.0], vec![3.0]]);
    }

    #[test]
    fn shorter_string_keeps_the_capacity() {
        let (sim, _canape, module) = setup();
        let CalibrationObject::Ascii(text) = module.get_calibration_object("text").unwrap() else {
            panic!("text is not ASCII")
        };
        text.set_ascii("hi").unwrap();
        assert_eq!(text.len().unwrap(), 5);
        text.set_ascii("world").unwrap();
        assert_eq!(text.ascii().unwrap(), "world");
        assert_eq!(
            sim.object_value(module.handle(), "text"),
            Some(CalibrationValue::Ascii { text: "world".into(), len: 5 })
        );

        // A fresh object sees the capacity, not the current text
        text.set_ascii("ab").unwrap();
        let CalibrationObject::Ascii(again) = module.get_calibration_object("text").unwrap() else {
            panic!("text is not ASCII")
        };
        assert_eq!(again.len().unwrap(), 5);
        assert!(matches!(
            again.set_ascii("abcdef"),
            Err(CanapeError::DimensionMismatch { expected, actual }) if expected == vec![5] && actual == vec![6]
        ));
    }

    #[test]
    fn measurements_are_not_writable() {
        let (_sim, _canape, module) = setup();
        let obj = module.get_calibration_object("channel1").unwrap();
        assert_eq!(obj.base().object_type(), ObjectType::Measure);
        assert!(matches!(obj.set_value(&CalibrationValue::Scalar(1.0)), Err(CanapeError::NotWritable(_))));
    }

    #[test]
    fn unknown_object() {
        let (_sim, _canape, module) = setup();
        assert!(matches!(module.get_calibration_object("nope"), Err(CanapeError::UnknownObject(n)) if n == "nope"));
    }
}
