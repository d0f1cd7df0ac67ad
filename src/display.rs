//! X11 display server access through the RandR extension.

use tracing::info;
use x11rb::connection::Connection;
use x11rb::protocol::randr::ConnectionExt as _;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt as _, PropMode};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::backlight::{Atom, DisplayServer, OutputId, PropertyInfo, Result, RootWindow};
use crate::error::BacklightError;

/// Oldest RandR version with output properties.
const RANDR_MAJOR: u32 = 1;
const RANDR_MINOR: u32 = 2;

/// Connection to an X server with RandR 1.2 or newer.
pub struct XDisplay {
    conn: RustConnection,
    roots: Vec<RootWindow>,
}

impl XDisplay {
    /// Connect to `name`, or to `$DISPLAY` when `None`.
    pub fn connect(name: Option<&str>) -> Result<Self> {
        let (conn, _screen) = x11rb::connect(name)?;

        let version = conn
            .randr_query_version(RANDR_MAJOR, RANDR_MINOR)?
            .reply()?;
        if version.major_version != RANDR_MAJOR || version.minor_version < RANDR_MINOR {
            return Err(BacklightError::RandrUnsupported {
                major: version.major_version,
                minor: version.minor_version,
            });
        }

        let roots = conn.setup().roots.iter().map(|screen| screen.root).collect();

        info!(
            display = name.unwrap_or("$DISPLAY"),
            randr = %format_args!("{}.{}", version.major_version, version.minor_version),
            "connected to display"
        );

        Ok(Self { conn, roots })
    }
}

impl DisplayServer for XDisplay {
    fn intern_atom(&self, name: &str) -> Result<Option<Atom>> {
        let atom = self.conn.intern_atom(true, name.as_bytes())?.reply()?.atom;
        Ok((atom != x11rb::NONE).then_some(atom))
    }

    fn roots(&self) -> Vec<RootWindow> {
        self.roots.clone()
    }

    fn outputs(&self, root: RootWindow) -> Result<Vec<OutputId>> {
        Ok(self.conn.randr_get_screen_resources(root)?.reply()?.outputs)
    }

    fn output_property(&self, output: OutputId, property: Atom) -> Result<Option<i32>> {
        let reply = self
            .conn
            .randr_get_output_property(output, property, Atom::from(AtomEnum::ANY), 0, 4, false, false)?
            .reply()?;
        Ok(integer_value(
            reply.type_,
            reply.format,
            reply.num_items,
            &reply.data,
        ))
    }

    fn query_property(&self, output: OutputId, property: Atom) -> Result<PropertyInfo> {
        let reply = self
            .conn
            .randr_query_output_property(output, property)?
            .reply()?;
        Ok(PropertyInfo {
            range: reply.range,
            valid_values: reply.valid_values,
        })
    }

    fn change_property(&self, output: OutputId, property: Atom, value: i32) -> Result<()> {
        self.conn
            .randr_change_output_property(
                output,
                property,
                Atom::from(AtomEnum::INTEGER),
                32,
                PropMode::REPLACE,
                1,
                &value.to_ne_bytes(),
            )?
            .check()?;
        self.conn.flush()?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.conn.sync()?;
        Ok(())
    }
}

/// Value of a property reply holding exactly one 32-bit INTEGER.
fn integer_value(type_: Atom, format: u8, num_items: u32, data: &[u8]) -> Option<i32> {
    if type_ != Atom::from(AtomEnum::INTEGER) || format != 32 || num_items != 1 {
        return None;
    }
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(i32::from_ne_bytes(bytes))
}
