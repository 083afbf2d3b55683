use super::*;

// ============================================================================
// Marker detection
// ============================================================================

#[test]
fn test_unmarked_source_is_not_translated() {
    let src = "#version 410\nvoid main() {}\n";
    assert_eq!(translate(src), None);
}

#[test]
fn test_marker_must_lead_the_file() {
    let src = "\n// JE_TRANSLATE\n#version 420\nvoid main() {}\n";
    assert_eq!(translate(src), None);
}

#[test]
fn test_marker_with_other_version_is_ignored() {
    let src = "// JE_TRANSLATE\n#version 450\nvoid main() {}\n";
    assert_eq!(translate(src), None);
}

#[test]
fn test_header_is_replaced_with_410() {
    let out = translate("// JE_TRANSLATE\n#version 420\nvoid main() {}").unwrap();
    assert_eq!(out, "#version 410\nvoid main() {}\n");
}

// ============================================================================
// Block uniforms
// ============================================================================

#[test]
fn test_marked_block_becomes_loose_uniforms() {
    let src = "// JE_TRANSLATE\n#version 420\n\
               layout(std140, binding = 0) uniform Globals { // JE_TRANSLATE\n\
               \x20   mat4 matrices[4];\n\
               \x20   vec3 cameraProperties[2];\n\
               \x20   vec3 ambience;\n\
               };\n\
               void main() {}";
    let out = translate(src).unwrap();
    assert_eq!(
        out,
        "#version 410\n\
         uniform    mat4 matrices[4];\n\
         uniform    vec3 cameraProperties[2];\n\
         uniform    vec3 ambience;\n\
         void main() {}\n"
    );
}

#[test]
fn test_block_of_n_members_yields_n_uniform_lines() {
    let members = ["\tfloat a;", "\tfloat b;", "\tvec2 c;", "\tvec4 d;", "\tmat3 e;"];
    let mut src = String::from("// JE_TRANSLATE\n#version 420\nlayout(binding = 1) uniform B { // JE_TRANSLATE\n");
    for m in &members {
        src.push_str(m);
        src.push('\n');
    }
    src.push_str("} b;\n");

    let out = translate(&src).unwrap();
    let uniform_lines: Vec<_> = out.lines().filter(|l| l.starts_with("uniform")).collect();
    assert_eq!(uniform_lines.len(), members.len());
    for (line, member) in uniform_lines.iter().zip(members.iter()) {
        assert_eq!(*line, format!("uniform{}", member));
    }
    assert!(!out.contains("layout"));
    assert!(!out.contains('{'));
    assert!(!out.contains('}'));
}

#[test]
fn test_empty_block_emits_nothing() {
    let src = "// JE_TRANSLATE\n#version 420\nlayout(binding = 0) uniform E { // JE_TRANSLATE\n};\nvoid main() {}";
    let out = translate(src).unwrap();
    assert_eq!(out, "#version 410\nvoid main() {}\n");
}

#[test]
fn test_unterminated_block_swallows_remaining_lines() {
    let src = "// JE_TRANSLATE\n#version 420\nlayout(binding = 0) uniform U { // JE_TRANSLATE\n    float x;";
    let out = translate(src).unwrap();
    assert_eq!(out, "#version 410\nuniform    float x;\n");
}

#[test]
fn test_member_on_header_line_is_lost() {
    let src = "// JE_TRANSLATE\n#version 420\nlayout(binding = 0) uniform U { float lost; // JE_TRANSLATE\n    float kept;\n};";
    let out = translate(src).unwrap();
    assert_eq!(out, "#version 410\nuniform    float kept;\n");
}

#[test]
fn test_block_without_tag_is_treated_as_single_line() {
    // Only the header line is rewritten; members are passed through.
    let src = "// JE_TRANSLATE\n#version 420\nlayout(std140) uniform Plain {\n    float x;\n};";
    let out = translate(src).unwrap();
    assert_eq!(out, "#version 410\nuniform Plain {\n    float x;\n};\n");
}

// ============================================================================
// Single-line layout uniforms
// ============================================================================

#[test]
fn test_layout_qualifier_is_stripped_from_sampler() {
    let src = "// JE_TRANSLATE\n#version 420\nlayout(binding = 1) uniform sampler2D tex;\n";
    let out = translate(src).unwrap();
    assert_eq!(out, "#version 410\nuniform sampler2D tex;\n\n");
}

#[test]
fn test_trailing_declaration_text_is_kept_verbatim() {
    let decl = "uniform samplerCube  sky ; // sky box";
    let src = format!("// JE_TRANSLATE\n#version 420\nlayout(set=1,binding=0) {decl}");
    let out = translate(&src).unwrap();
    assert_eq!(out.lines().nth(1), Some(decl));
}

#[test]
fn test_layout_inputs_are_untouched() {
    let src = "// JE_TRANSLATE\n#version 420\nlayout(location = 0) in vec3 position;\nlayout(location = 0) out vec4 color;";
    let out = translate(src).unwrap();
    assert_eq!(
        out,
        "#version 410\nlayout(location = 0) in vec3 position;\nlayout(location = 0) out vec4 color;\n"
    );
}

#[test]
fn test_indented_layout_uniform_is_not_matched() {
    // The rule keys on the line start, so indentation defeats it.
    let src = "// JE_TRANSLATE\n#version 420\n  layout(binding = 0) uniform sampler2D t;";
    let out = translate(src).unwrap();
    assert_eq!(out, "#version 410\n  layout(binding = 0) uniform sampler2D t;\n");
}

#[test]
fn test_trailing_newline_is_preserved_as_empty_line() {
    let out = translate("// JE_TRANSLATE\n#version 420\n").unwrap();
    assert_eq!(out, "#version 410\n\n");
}

// ============================================================================
// Bundled shaders
// ============================================================================

#[test]
fn test_bundled_opengl_shaders_translate_to_410() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders/opengl");
    for name in ["basic.vert", "basic.frag"] {
        let src = std::fs::read_to_string(dir.join(name)).unwrap();
        let out = translate(&src).unwrap();
        assert!(out.starts_with("#version 410\n"), "{name}");
        assert!(!out.contains("binding"), "{name}");
        assert!(!out.contains("std140"), "{name}");
    }

    let frag = translate(&std::fs::read_to_string(dir.join("basic.frag")).unwrap()).unwrap();
    assert!(frag.contains("uniform sampler2D albedo;"));
    assert!(frag.contains("uniform    vec3 cameraProperties[2];"));
    assert!(frag.contains("uniform    vec3 ambience;"));
}
