// GLSL dialect translation: Vulkan GLSL 4.20 -> OpenGL GLSL 4.10
//
// A line-oriented text rewrite, not a parser. Sources opt in by starting with
// the translation marker followed by the 4.20 version header:
//
//     // JE_TRANSLATE
//     #version 420
//
// Rules, applied line by line after swapping the header for `#version 410`:
//
// * `layout(...) uniform Block { // JE_TRANSLATE` starts a block. Every
//   following line up to (not including) the first line starting with `}`
//   is emitted with a literal `uniform` prefix. The header and closing lines
//   are dropped, so the block becomes loose default-block uniforms.
// * any other `layout(...) uniform ...` line loses everything before the
//   `uniform` keyword (4.10 has no `binding` qualifier on uniforms).
// * every other line passes through untouched.
//
// Known limitations: members must sit on their own lines
// (a member on the `{` line is lost), the prefix is glued on without a space
// so members are expected to be indented, and a block with no closing line
// swallows the rest of the file.

/// Comment + version header that marks a source for translation.
pub const TRANSLATION_MARKER: &str = "// JE_TRANSLATE\n#version 420";

/// Tag that marks a `layout ... uniform` line as a block header.
const BLOCK_TAG: &str = "JE_TRANSLATE";

/// Version header emitted for the lower dialect.
const TARGET_VERSION: &str = "#version 410";

/// Rewrite a marked 4.20 source into 4.10.
///
/// Returns `None` when the source does not start with [`TRANSLATION_MARKER`];
/// unmarked sources are handed to the compiler as they are.
pub fn translate(source: &str) -> Option<String> {
    let body = source.strip_prefix(TRANSLATION_MARKER)?;
    let rewritten = format!("{TARGET_VERSION}{body}");

    let lines: Vec<&str> = rewritten.split('\n').collect();
    let mut out = String::with_capacity(rewritten.len() + 64);

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if is_layout_uniform(line) {
            if line.contains(BLOCK_TAG) {
                i += 1;
                while i < lines.len() && !lines[i].starts_with('}') {
                    out.push_str("uniform");
                    out.push_str(lines[i]);
                    out.push('\n');
                    i += 1;
                }
                // Skip the closing line as well.
                i += 1;
                continue;
            }

            if let Some(start) = line.find("uniform") {
                out.push_str(&line[start..]);
                out.push('\n');
                i += 1;
                continue;
            }
        }

        out.push_str(line);
        out.push('\n');
        i += 1;
    }

    Some(out)
}

fn is_layout_uniform(line: &str) -> bool {
    line.starts_with("layout") && line.contains("uniform")
}

#[cfg(test)]
#[path = "translate_tests.rs"]
mod tests;
