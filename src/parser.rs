//! Address parsing.
//!
//! An address list is a sequence of bases (`.`, `$`, digits, `/pat/`,
//! `?pat?`, `'x`) with `+`/`-` offsets, joined by `,`, `;` or `%`. The
//! parser consumes the command buffer up to the verb and yields
//! `(first, second, count)` with `count` in 0..=2; defaulting to the
//! current address when no address was given. `;` re-scopes by setting
//! `current` to the left address as it goes.

use crate::buffer::LineBuffer;
use crate::error::{EdError, Result};
use crate::io::Input;
use crate::regexp::{self, RegexPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrRange {
    pub first: usize,
    pub second: usize,
    /// Number of addresses supplied (0, 1 or 2).
    pub count: usize,
}

/// Parse a decimal integer (with optional sign) at the cursor.
pub fn parse_int(input: &mut Input) -> Result<i64> {
    let mut off = 0;
    let mut sign: i64 = 1;
    match input.peek() {
        b'+' => off += 1,
        b'-' => {
            sign = -1;
            off += 1;
        }
        _ => {}
    }
    let mut value: i64 = 0;
    let mut digits = 0;
    while input.peek_at(off).is_ascii_digit() {
        value = value * 10 + (input.peek_at(off) - b'0') as i64;
        if value > i32::MAX as i64 {
            // consume the rest of the number before reporting
            while input.peek_at(off).is_ascii_digit() {
                off += 1;
            }
            input.advance(off);
            return Err(EdError::NumberOutOfRange);
        }
        off += 1;
        digits += 1;
    }
    if digits == 0 {
        return Err(EdError::BadNumber);
    }
    input.advance(off);
    Ok(sign * value)
}

/// Read line addresses from the command buffer until a character that is
/// not part of an address is seen.
pub fn extract_addresses(
    input: &mut Input,
    buffer: &mut LineBuffer,
    pool: &mut RegexPool,
    extended: bool,
) -> Result<AddrRange> {
    let mut first: i64 = -1; // undefined
    let mut second: i64 = -1;
    let mut expecting_base = true; // false once a base was read (offsets follow)

    input.skip_blanks();
    loop {
        let ch = input.peek();
        if ch.is_ascii_digit() {
            let n = parse_int(input)?;
            if expecting_base {
                expecting_base = false;
                second = n;
            } else {
                second += n;
            }
            continue;
        }
        match ch {
            b'\t' | b' ' => {
                input.advance(1);
                input.skip_blanks();
            }
            b'+' | b'-' => {
                if expecting_base {
                    expecting_base = false;
                    second = buffer.current_addr() as i64;
                }
                if input.peek_at(1).is_ascii_digit() {
                    second += parse_int(input)?;
                } else {
                    input.advance(1);
                    if ch == b'+' {
                        second += 1;
                    } else {
                        second -= 1;
                    }
                }
            }
            b'.' | b'$' => {
                if !expecting_base {
                    return Err(EdError::InvalidAddress);
                }
                expecting_base = false;
                input.advance(1);
                second = if ch == b'.' {
                    buffer.current_addr() as i64
                } else {
                    buffer.last_addr() as i64
                };
            }
            b'/' | b'?' => {
                if !expecting_base {
                    return Err(EdError::InvalidAddress);
                }
                second = regexp::next_matching_node_addr(input, buffer, pool, extended)? as i64;
                expecting_base = false;
            }
            b'\'' => {
                if !expecting_base {
                    return Err(EdError::InvalidAddress);
                }
                expecting_base = false;
                input.advance(1);
                let mark = input.next_byte();
                second = buffer.marked_node_addr(mark)? as i64;
            }
            b'%' | b',' | b';' => {
                if expecting_base {
                    if first < 0 {
                        // a bare separator seeds the full range
                        first = if ch == b';' { buffer.current_addr() as i64 } else { 1 };
                        second = buffer.last_addr() as i64;
                    } else {
                        first = second;
                    }
                } else {
                    if second < 0 || second > buffer.last_addr() as i64 {
                        return Err(EdError::InvalidAddress);
                    }
                    if ch == b';' {
                        buffer.set_current_addr(second as usize);
                    }
                    first = second;
                    expecting_base = true;
                }
                input.advance(1);
            }
            _ => {
                if !expecting_base && (second < 0 || second > buffer.last_addr() as i64) {
                    return Err(EdError::InvalidAddress);
                }
                let mut count = 0;
                if second >= 0 {
                    count = if first >= 0 { 2 } else { 1 };
                }
                if count == 0 {
                    second = buffer.current_addr() as i64;
                }
                if count <= 1 {
                    first = second;
                }
                return Ok(AddrRange { first: first as usize, second: second as usize, count });
            }
        }
    }
}

/// Parse the destination address of `m`/`t`, validating it against the
/// buffer.
pub fn get_third_addr(
    input: &mut Input,
    buffer: &mut LineBuffer,
    pool: &mut RegexPool,
    extended: bool,
    traditional: bool,
) -> Result<usize> {
    let r = extract_addresses(input, buffer, pool, extended)?;
    if traditional && r.count == 0 {
        return Err(EdError::DestinationExpected);
    }
    if r.second > buffer.last_addr() {
        return Err(EdError::InvalidAddress);
    }
    Ok(r.second)
}
