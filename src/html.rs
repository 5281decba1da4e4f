use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::fs_probe::{FsKind, FsLocation};
use crate::param::status_text;

/// 与浏览器 `encodeURIComponent` 相同的保留字符集
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const BASE_CSS: &str = r"
    :root { color-scheme: light dark; --gap: 0.5rem; }
    body { max-width: 64rem; margin: 0 auto; padding: 1rem; font-family: system-ui, sans-serif; line-height: 1.4; }
    h1 { font-size: 1.25rem; font-weight: 500; word-break: break-all; }
    h1 a { color: inherit; }
    code { font-size: 0.9em; word-break: break-all; }
";

const LIST_CSS: &str = r"
    .files { list-style: none; margin: 0; padding: 0; columns: 15rem var(--max-col-count, 4); column-gap: var(--gap); }
    .files li { break-inside: avoid; }
    .files a { display: flex; gap: var(--gap); align-items: center; padding: 0.25rem; text-decoration: none; color: inherit; }
    .files a:hover { background: color-mix(in srgb, currentColor 10%, transparent); }
    .files .icon { flex: none; fill: currentColor; opacity: 0.7; }
    .files .name { overflow-wrap: anywhere; }
";

const ICON_SPRITE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="0" height="0" style="position:absolute">
<symbol id="icon-dir" viewBox="0 0 20 20"><path d="M2 4h6l2 2h8v10H2z"/></symbol>
<symbol id="icon-file" viewBox="0 0 20 20"><path d="M5 2h7l4 4v12H5zM12 2v4h4"/></symbol>
<symbol id="icon-dir-link" viewBox="0 0 20 20"><path d="M2 4h6l2 2h8v10H2z"/><path d="M8 13l4-4M9 9h3v3" stroke="#fff" fill="none"/></symbol>
<symbol id="icon-file-link" viewBox="0 0 20 20"><path d="M5 2h7l4 4v12H5z"/><path d="M8 14l4-4M9 10h3v3" stroke="#fff" fill="none"/></symbol>
</svg>"##;

/// 转义文本内容中的 `&`、`<`、`>`
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// 转义属性值，额外处理引号
pub fn escape_attr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// 文件名中的换行等控制字符替换为空格，避免破坏列表排版
pub fn clean_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\u{000A}'..='\u{000D}' | '\u{2028}' => ' ',
            _ => c,
        })
        .collect()
}

fn decode_lossy(url_path: &str) -> String {
    percent_decode_str(url_path).decode_utf8_lossy().into_owned()
}

/// 目录列表中的一项
struct ListItem {
    icon: &'static str,
    name: String,
    href: String,
}

impl ListItem {
    fn parent() -> Self {
        Self {
            icon: "icon-dir",
            name: "..".to_string(),
            href: "../".to_string(),
        }
    }

    fn from_location(location: &FsLocation, ext: &[String]) -> Self {
        let file_name = location.file_name();
        let is_dir = location.is_dir_like();
        let icon = match (location.kind, is_dir) {
            (FsKind::Link, true) => "icon-dir-link",
            (FsKind::Link, false) => "icon-file-link",
            (_, true) => "icon-dir",
            _ => "icon-file",
        };

        let href_name = if is_dir {
            file_name.as_str()
        } else {
            ext.iter()
                .find(|suffix| file_name.len() > suffix.len() && file_name.ends_with(suffix.as_str()))
                .map(|suffix| &file_name[..file_name.len() - suffix.len()])
                .unwrap_or(file_name.as_str())
        };
        let mut href = utf8_percent_encode(href_name, URI_COMPONENT).to_string();
        let mut name = clean_name(&file_name);
        if is_dir {
            href.push('/');
            name.push('/');
        }
        Self { icon, name, href }
    }

    fn render(&self) -> String {
        format!(
            r##"<li><a href="{}"><svg class="icon" width="20" height="20"><use href="#{}"></use></svg><span class="name">{}</span></a></li>"##,
            escape_attr(&self.href),
            self.icon,
            escape_html(&self.name)
        )
    }
}

/// HTML 页面构建器，生成目录列表页与错误页
pub struct HtmlBuilder {
    title: Option<String>,
    base: Option<String>,
    css: String,
    body: String,
}

impl HtmlBuilder {
    /// 错误页。未知状态码生成与 URL 无关的通用页面。
    pub fn from_status_code(code: u16, url_path: &str) -> Self {
        let path = format!("<code>{}</code>", escape_html(&decode_lossy(url_path)));
        let description = match code {
            400 => Some(format!("Invalid path for {}", path)),
            403 => Some(format!("Could not access {}", path)),
            404 => Some(format!("Could not find {}", path)),
            405 => Some(format!("Invalid HTTP method for {}", path)),
            500 => Some(format!("Could not serve {}", path)),
            _ => None,
        };
        let (title, body) = match description {
            Some(d) => {
                let title = format!("{}: {}", code, status_text(code));
                let body = format!("<h1>{}</h1>\n<p>{}</p>", escape_html(&title), d);
                (title, body)
            }
            None => (
                "Error".to_string(),
                "<h1>Error</h1>\n<p>Something went wrong</p>".to_string(),
            ),
        };
        Self {
            title: Some(title),
            base: None,
            css: BASE_CSS.to_string(),
            body,
        }
    }

    /// 目录列表页。`items` 应当已经按名称排序，目录会被移到文件之前。
    pub fn from_dir(root_name: &str, url_path: &str, items: &[FsLocation], ext: &[String]) -> Self {
        let trimmed = url_path.trim_matches('/');
        let display_path = decode_lossy(trimmed);
        let title = format!("Index of {}/{}", clean_name(root_name), clean_name(&display_path));
        let base = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", trimmed)
        };

        // 面包屑导航：根目录名称链接到 `/`，之后每一级链接到对应的目录
        let mut crumbs = format!(r#"<a href="/">{}</a>"#, escape_html(&clean_name(root_name)));
        let mut href = String::from("/");
        for segment in trimmed.split('/').filter(|s| !s.is_empty()) {
            href.push_str(segment);
            href.push('/');
            crumbs.push_str(&format!(
                r#"/<a href="{}">{}</a>"#,
                escape_attr(&href),
                escape_html(&clean_name(&decode_lossy(segment)))
            ));
        }

        let mut list_items = vec![];
        if !trimmed.is_empty() {
            list_items.push(ListItem::parent());
        }
        let (dirs, files): (Vec<&FsLocation>, Vec<&FsLocation>) =
            items.iter().partition(|item| item.is_dir_like());
        list_items.extend(dirs.into_iter().map(|d| ListItem::from_location(d, ext)));
        list_items.extend(files.into_iter().map(|f| ListItem::from_location(f, ext)));

        let col_count = list_items.len().div_ceil(3).clamp(1, 4);
        let rendered: Vec<String> = list_items.iter().map(|i| i.render()).collect();
        let body = format!(
            "{}\n<h1>Index of {}</h1>\n<ul class=\"files\" style=\"--max-col-count:{}\">\n{}\n</ul>",
            ICON_SPRITE,
            crumbs,
            col_count,
            rendered.join("\n")
        );

        Self {
            title: Some(title),
            base: Some(base),
            css: [BASE_CSS, LIST_CSS].concat(),
            body,
        }
    }

    pub fn build(&self) -> String {
        let title = match &self.title {
            Some(t) => format!("<title>{}</title>\n", escape_html(t)),
            None => String::new(),
        };
        let base = match &self.base {
            Some(b) => format!("<base href=\"{}\">\n", escape_attr(b)),
            None => String::new(),
        };
        format!(
            r##"<!doctype html>
<html lang="en">
<meta charset="UTF-8">
{}{}<meta name="viewport" content="width=device-width, initial-scale=1">
<style>{}</style>
<body>
{}
</body>
</html>
"##,
            title, base, self.css, self.body
        )
    }
}
