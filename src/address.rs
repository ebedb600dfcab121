use core::fmt;
use core::str::FromStr;

use crate::A2dpError;

/// Address of the remote sink (`BD_ADDR`), bytes kept in the order bt-hci uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BluetoothAddress(pub [u8; 6]);

impl BluetoothAddress {
    /// Wrap raw address bytes
    #[must_use]
    pub const fn new(addr: [u8; 6]) -> Self {
        Self(addr)
    }

    /// Raw address bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for BluetoothAddress {
    type Err = A2dpError;

    /// Parse `AA:BB:CC:DD:EE:FF`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 17 {
            return Err(A2dpError::InvalidParameter);
        }
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in &mut bytes {
            let part = parts.next().ok_or(A2dpError::InvalidParameter)?;
            if part.len() != 2 {
                return Err(A2dpError::InvalidParameter);
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| A2dpError::InvalidParameter)?;
        }
        if parts.next().is_some() {
            return Err(A2dpError::InvalidParameter);
        }
        Ok(Self(bytes))
    }
}

impl From<[u8; 6]> for BluetoothAddress {
    fn from(addr: [u8; 6]) -> Self {
        Self(addr)
    }
}

impl From<BluetoothAddress> for bt_hci::param::BdAddr {
    fn from(addr: BluetoothAddress) -> Self {
        bt_hci::param::BdAddr::new(addr.0)
    }
}

impl TryFrom<bt_hci::param::BdAddr> for BluetoothAddress {
    type Error = A2dpError;

    fn try_from(bd_addr: bt_hci::param::BdAddr) -> Result<Self, Self::Error> {
        let raw = bd_addr.raw();
        if raw.len() != 6 {
            return Err(A2dpError::InvalidParameter);
        }
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(raw);
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_parse_and_display() {
        let addr: BluetoothAddress = "00:1B:66:AB:CD:EF".parse().unwrap();
        assert_eq!(addr.0, [0x00, 0x1B, 0x66, 0xAB, 0xCD, 0xEF]);
        assert_eq!(addr.to_string(), "00:1B:66:AB:CD:EF");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("00:1B:66:AB:CD".parse::<BluetoothAddress>().is_err());
        assert!("00-1B-66-AB-CD-EF".parse::<BluetoothAddress>().is_err());
        assert!("00:1B:66:AB:CD:EG".parse::<BluetoothAddress>().is_err());
        assert!("001:B:66:AB:CD:EF".parse::<BluetoothAddress>().is_err());
    }

    #[test]
    fn test_hci_conversion() {
        let addr = BluetoothAddress::new([1, 2, 3, 4, 5, 6]);
        let bd_addr: bt_hci::param::BdAddr = addr.into();
        assert_eq!(bd_addr.raw(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(BluetoothAddress::try_from(bd_addr).unwrap(), addr);
    }
}
