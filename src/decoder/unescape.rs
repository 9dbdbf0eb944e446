//! 嵌入式 JSON 字符串的分层反转义。
//!
//! SSR 页面把组件状态 JSON 再次序列化成 JS 字符串，字段值因此是“双重转义”的：
//! 先是宿主字符串的一层（`\\` / `\"`），再是 JSON 自身的一层（`\n`、`\uXXXX`）。
//! 解码时必须先匹配更长的双重序列，再匹配单层序列，否则 `\\n` 会被拆成 `\` + 换行。

use std::borrow::Cow;

/// 反转义嵌入式 JSON 字段值。没有反斜杠的输入原样借用返回。
///
/// 输入应当是仍处于转义状态的原始字段值。未知的转义（如 `\p`）保留反斜杠，
/// 但已解码文本里碰巧出现的 `\n`、`\t`、`\u` 会被再解一次，所以对任意文本
/// 并不幂等，不要对同一个值重复调用。
pub fn unescape_layered(input: &str) -> Cow<'_, str> {
    if !input.contains('\\') {
        return Cow::Borrowed(input);
    }

    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut run_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            i += 1;
            continue;
        }
        out.push_str(&input[run_start..i]);
        let consumed = decode_escape_at(&input[i..], &mut out);
        i += consumed;
        run_start = i;
    }
    out.push_str(&input[run_start..]);

    Cow::Owned(out)
}

/// 把 `rest`（以反斜杠开头）开头的一个转义序列写入 `out`，返回消耗的字节数。
fn decode_escape_at(rest: &str, out: &mut String) -> usize {
    let b = rest.as_bytes();
    let at = |n: usize| b.get(n).copied();

    // 双重转义：\\\\ \\\" \\n \\t \\r \\/ \\uXXXX
    if at(1) == Some(b'\\') {
        match (at(2), at(3)) {
            (Some(b'\\'), Some(b'\\')) => {
                out.push('\\');
                return 4;
            }
            (Some(b'\\'), Some(b'"')) => {
                out.push('"');
                return 4;
            }
            (Some(c), _) if simple_escape(c).is_some() => {
                out.push(simple_escape(c).unwrap_or_default());
                return 3;
            }
            (Some(b'u'), _) => {
                if let Some(used) = decode_unicode(&rest[2..], out) {
                    return 2 + used;
                }
            }
            _ => {}
        }
        out.push('\\');
        return 2;
    }

    // 单层转义：\" \n \t \r \/ \uXXXX
    match at(1) {
        Some(b'"') => {
            out.push('"');
            2
        }
        Some(c) if simple_escape(c).is_some() => {
            out.push(simple_escape(c).unwrap_or_default());
            2
        }
        Some(b'u') => match decode_unicode(&rest[1..], out) {
            Some(used) => 1 + used,
            None => {
                out.push('\\');
                1
            }
        },
        _ => {
            out.push('\\');
            1
        }
    }
}

fn simple_escape(c: u8) -> Option<char> {
    match c {
        b'n' => Some('\n'),
        b't' => Some('\t'),
        b'r' => Some('\r'),
        b'/' => Some('/'),
        _ => None,
    }
}

/// `s` 以 `uXXXX` 开头。成功时写入字符并返回消耗的字节数（含可能的低位代理）。
fn decode_unicode(s: &str, out: &mut String) -> Option<usize> {
    let high = parse_hex4(s.get(1..5)?)?;

    if (0xD800..0xDC00).contains(&high) {
        // 低位代理可能同样是双重或单层转义
        let tail = &s[5..];
        let (prefix, low_str) = if let Some(t) = tail.strip_prefix("\\\\u") {
            (3, t.get(..4))
        } else if let Some(t) = tail.strip_prefix("\\u") {
            (2, t.get(..4))
        } else {
            (0, None)
        };
        if let Some(low) = low_str.and_then(parse_hex4)
            && (0xDC00..0xE000).contains(&low)
        {
            let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
            out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            return Some(5 + prefix + 4);
        }
        out.push(char::REPLACEMENT_CHARACTER);
        return Some(5);
    }

    out.push(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER));
    Some(5)
}

fn parse_hex4(s: &str) -> Option<u32> {
    if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(s, 16).ok()
}

/// 单层 JSON 字符串转义（不含外围引号）。
pub fn escape_json_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// 与 [`unescape_layered`] 相反：模拟 SSR 宿主的两层转义，主要用于构造测试页面。
pub fn escape_layered(input: &str) -> String {
    escape_json_string(&escape_json_string(input))
}
