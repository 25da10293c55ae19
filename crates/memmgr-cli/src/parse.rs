use memmgr_core::AddressSpec;

/// Parses a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_number(s: &str) -> Result<u64, String> {
    let s = s.trim().replace('_', "");
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|err| format!("invalid number {s:?}: {err}"))
}

pub fn parse_u32(s: &str) -> Result<u32, String> {
    let value = parse_number(s)?;
    u32::try_from(value).map_err(|_| format!("{s} does not fit in 32 bits"))
}

/// Parses `0x1000`, `symbol` or `symbol+0x10`.
pub fn parse_address(s: &str) -> Result<AddressSpec, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("address is empty".to_string());
    }
    if let Some((name, offset)) = s.split_once('+') {
        return Ok(AddressSpec::symbol(name.trim(), parse_number(offset)?));
    }
    if s.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(AddressSpec::absolute(parse_number(s)?));
    }
    Ok(AddressSpec::symbol(s, 0))
}

/// Parses hex bytes such as `deadbeef` or `de ad be ef`.
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<u8> = s
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err("hex data must have an even number of digits".to_string());
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).map_err(|_| "hex data is not ASCII".to_string())?;
            u8::from_str_radix(text, 16).map_err(|_| format!("invalid hex byte {text:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(parse_number("4096"), Ok(4096));
        assert_eq!(parse_number("0x1000_0000"), Ok(0x1000_0000));
        assert!(parse_number("0xZZ").is_err());
        assert!(parse_u32("0x1_0000_0000").is_err());
    }

    #[test]
    fn addresses() {
        assert_eq!(parse_address("0x20"), Ok(AddressSpec::absolute(0x20)));
        assert_eq!(parse_address("sci_buf"), Ok(AddressSpec::symbol("sci_buf", 0)));
        assert_eq!(
            parse_address("sci_buf+0x10"),
            Ok(AddressSpec::symbol("sci_buf", 0x10))
        );
        assert!(parse_address("").is_err());
        assert!(parse_address("sci_buf+zz").is_err());
    }

    #[test]
    fn hex_bytes() {
        assert_eq!(parse_hex_bytes("de ad:BE ef"), Ok(vec![0xDE, 0xAD, 0xBE, 0xEF]));
        assert!(parse_hex_bytes("abc").is_err());
        assert!(parse_hex_bytes("zz").is_err());
    }
}
