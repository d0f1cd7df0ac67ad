//! Backlight control through per-output display properties.
//!
//! Each output may expose its backlight as an integer property with a
//! declared valid range. The controller looks the property up under its
//! current name first and its legacy name second, rescales a 0-100 score into
//! the advertised range and writes it back on every output that accepts it.

use tracing::{debug, warn};

use crate::error::BacklightError;

/// Result type for display operations.
pub type Result<T> = std::result::Result<T, BacklightError>;

/// Interned property name.
pub type Atom = u32;
/// Display output identifier.
pub type OutputId = u32;
/// Root window of a screen.
pub type RootWindow = u32;

/// Preferred backlight property name.
pub const BACKLIGHT_PROPERTY: &str = "Backlight";
/// Backlight property name used by older drivers.
pub const LEGACY_BACKLIGHT_PROPERTY: &str = "BACKLIGHT";

/// Declared validity of an output property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    /// Whether `valid_values` are range bounds rather than an enumeration.
    pub range: bool,
    /// Declared valid values.
    pub valid_values: Vec<i32>,
}

/// Round trips the controller needs from a display server.
///
/// Every call blocks until the server has answered.
pub trait DisplayServer {
    /// Look up an existing atom; `None` if no client ever interned `name`.
    fn intern_atom(&self, name: &str) -> Result<Option<Atom>>;

    /// Root window of every screen.
    fn roots(&self) -> Vec<RootWindow>;

    /// Outputs attached to the screen of `root`.
    fn outputs(&self, root: RootWindow) -> Result<Vec<OutputId>>;

    /// Current value of `property` if the output carries it as one 32-bit integer.
    fn output_property(&self, output: OutputId, property: Atom) -> Result<Option<i32>>;

    /// Declared valid values of `property`.
    fn query_property(&self, output: OutputId, property: Atom) -> Result<PropertyInfo>;

    /// Replace the value of `property` and wait until the server processed it.
    fn change_property(&self, output: OutputId, property: Atom, value: i32) -> Result<()>;

    /// Round trip to the server so earlier requests are observed.
    fn sync(&self) -> Result<()>;
}

impl<D: DisplayServer + ?Sized> DisplayServer for &D {
    fn intern_atom(&self, name: &str) -> Result<Option<Atom>> {
        (**self).intern_atom(name)
    }

    fn roots(&self) -> Vec<RootWindow> {
        (**self).roots()
    }

    fn outputs(&self, root: RootWindow) -> Result<Vec<OutputId>> {
        (**self).outputs(root)
    }

    fn output_property(&self, output: OutputId, property: Atom) -> Result<Option<i32>> {
        (**self).output_property(output, property)
    }

    fn query_property(&self, output: OutputId, property: Atom) -> Result<PropertyInfo> {
        (**self).query_property(output, property)
    }

    fn change_property(&self, output: OutputId, property: Atom, value: i32) -> Result<()> {
        (**self).change_property(output, property, value)
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }
}

/// Inclusive range of hardware backlight values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidRange {
    min: i32,
    max: i32,
}

impl ValidRange {
    /// Range `[min, max]`, or `None` if it is inverted.
    pub const fn new(min: i32, max: i32) -> Option<Self> {
        if min <= max {
            Some(Self { min, max })
        } else {
            None
        }
    }

    /// Lower bound.
    pub const fn min(self) -> i32 {
        self.min
    }

    /// Upper bound.
    pub const fn max(self) -> i32 {
        self.max
    }

    /// Map a 0-100 score linearly onto the range. Scores above 100 saturate.
    pub fn rescale(self, percent: u8) -> i32 {
        let min = i64::from(self.min);
        let max = i64::from(self.max);
        let scaled = min + i64::from(percent.min(100)) * (max - min) / 100;
        i32::try_from(scaled.clamp(min, max)).unwrap_or(self.max)
    }
}

/// Backlight property found on one output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputProperty {
    /// Output carrying the property.
    pub output: OutputId,
    /// Atom the property was found under.
    pub property: Atom,
    /// Value read during discovery.
    pub current: i32,
    /// Declared validity.
    pub info: PropertyInfo,
}

impl OutputProperty {
    /// Adjustable range, if the property is a range with exactly two bounds.
    pub fn range(&self) -> Option<ValidRange> {
        match self.info.valid_values.as_slice() {
            [min, max] if self.info.range => ValidRange::new(*min, *max),
            _ => None,
        }
    }
}

/// Sets backlight brightness on every output of a display.
pub struct BacklightController<D> {
    display: D,
    candidates: Vec<Atom>,
}

impl<D: DisplayServer> BacklightController<D> {
    /// Resolve the property names and make sure some output carries one.
    pub fn new(display: D) -> Result<Self> {
        let mut candidates = Vec::with_capacity(2);
        for name in [BACKLIGHT_PROPERTY, LEGACY_BACKLIGHT_PROPERTY] {
            if let Some(atom) = display.intern_atom(name)? {
                debug!(name, atom, "backlight property name known to server");
                candidates.push(atom);
            }
        }

        if candidates.is_empty() {
            return Err(BacklightError::NoBacklightCapability);
        }

        let controller = Self {
            display,
            candidates,
        };

        if controller.discover().is_empty() {
            return Err(BacklightError::NoBacklightCapability);
        }

        Ok(controller)
    }

    /// Underlying display server.
    pub const fn display(&self) -> &D {
        &self.display
    }

    /// Find the backlight property on every output of every screen.
    ///
    /// Screens and outputs that fail to answer are logged and skipped.
    pub fn discover(&self) -> Vec<OutputProperty> {
        let mut found = Vec::new();

        for root in self.display.roots() {
            let outputs = match self.display.outputs(root) {
                Ok(outputs) => outputs,
                Err(err) => {
                    warn!(root, %err, "RandR get screen resources failed");
                    continue;
                }
            };

            for output in outputs {
                match self.discover_output(output) {
                    Ok(Some(property)) => found.push(property),
                    Ok(None) => debug!(output, "output has no backlight property"),
                    Err(err) => warn!(output, %err, "backlight discovery failed"),
                }
            }
        }

        found
    }

    fn discover_output(&self, output: OutputId) -> Result<Option<OutputProperty>> {
        for &property in &self.candidates {
            let current = match self.display.output_property(output, property) {
                Ok(Some(current)) => current,
                Ok(None) => continue,
                Err(err) => {
                    debug!(output, property, %err, "property lookup failed, trying next name");
                    continue;
                }
            };

            let info = self.display.query_property(output, property)?;
            return Ok(Some(OutputProperty {
                output,
                property,
                current,
                info,
            }));
        }

        Ok(None)
    }

    /// Write `percent` (0-100) to every adjustable output.
    ///
    /// Returns the number of outputs that accepted the write. Zero is a soft
    /// failure the caller may report and retry on the next cycle.
    pub fn set_brightness(&self, percent: u8) -> usize {
        let mut written = 0;

        for found in self.discover() {
            let Some(range) = found.range() else {
                debug!(output = found.output, "backlight property is not a bounded range");
                continue;
            };

            let value = range.rescale(percent);
            match self
                .display
                .change_property(found.output, found.property, value)
            {
                Ok(()) => {
                    debug!(
                        output = found.output,
                        previous = found.current,
                        value,
                        min = range.min(),
                        max = range.max(),
                        "backlight set"
                    );
                    written += 1;
                }
                Err(err) => warn!(output = found.output, %err, "backlight write failed"),
            }
        }

        if let Err(err) = self.display.sync() {
            warn!(%err, "display sync failed");
        }

        written
    }
}
