//! 路径与格式化相关的通用工具函数

/// 把请求行中的原始路径规整为过滤器与解析器使用的形式。
///
/// 去掉开头的 `/`、结尾的空白，并做百分号解码。解码失败、解码结果不是
/// UTF-8 或包含空字节时返回 `None`，调用方应据此返回 400。
pub fn normalize_request_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim_start_matches('/').trim_end();
    let decoded = percent_decode(trimmed)?;
    if decoded.contains('\0') {
        return None;
    }
    Some(decoded)
}

/// 百分号解码（`%2e` → `.`）。`+` 保持原样，路径里它不代表空格。
pub fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex_value(*bytes.get(i + 1)?)?;
            let lo = hex_value(*bytes.get(i + 2)?)?;
            out.push(hi << 4 | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// 路径的最后一段（文件名部分）。
pub fn last_segment(path: &str) -> &str {
    path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or("")
}

/// 最后一段以 `.` 开头即视为隐藏文件
pub fn is_hidden(path: &str) -> bool {
    last_segment(path).starts_with('.')
}

/// 大小写不敏感的后缀匹配。`suffix_lower` 须已转为小写。
pub fn ends_with_ignore_case(path: &str, suffix_lower: &str) -> bool {
    path.to_lowercase().ends_with(suffix_lower)
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_size() {
        let a = 9926;
        let b = 51800;
        assert_eq!(format_file_size(a), "9.7 KB".to_string());
        assert_eq!(format_file_size(b), "50.6 KB".to_string());
    }

    #[test]
    fn test_file_size_units() {
        assert_eq!(format_file_size(0), "0.0 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1048576), "1.0 MB");
        assert_eq!(format_file_size(1073741824), "1.0 GB");
        assert_eq!(format_file_size(1099511627776), "1.0 TB");
    }

    #[test]
    fn test_normalize_strips_slashes_and_trailing_space() {
        assert_eq!(normalize_request_path("/index.html").unwrap(), "index.html");
        assert_eq!(normalize_request_path("//a/b.txt  ").unwrap(), "a/b.txt");
        assert_eq!(normalize_request_path("/").unwrap(), "");
        assert_eq!(normalize_request_path("").unwrap(), "");
    }

    #[test]
    fn test_normalize_decodes_percent_escapes() {
        assert_eq!(normalize_request_path("/%2e%2e/etc").unwrap(), "../etc");
        assert_eq!(normalize_request_path("/a%20b.txt").unwrap(), "a b.txt");
        assert_eq!(normalize_request_path("/%2Eenv").unwrap(), ".env");
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_request_path("/bad%zz").is_none());
        assert!(normalize_request_path("/trunc%2").is_none());
        assert!(normalize_request_path("/index.html%00.jpg").is_none());
        assert!(normalize_request_path("/%ff%fe").is_none());
    }

    #[test]
    fn test_hidden_is_filename_only() {
        assert!(is_hidden(".env"));
        assert!(is_hidden("a/b/.htaccess"));
        assert!(!is_hidden(".well-known/security.txt"));
        assert!(!is_hidden("index.html"));
        assert!(!is_hidden(""));
    }

    #[test]
    fn test_suffix_match_ignores_case() {
        assert!(ends_with_ignore_case("docs/A.SECRET", ".secret"));
        assert!(!ends_with_ignore_case("docs/a.secret.txt", ".secret"));
    }
}
