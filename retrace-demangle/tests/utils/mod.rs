#[macro_export]
macro_rules! assert_demangle {
    ($l:expr, $o:expr, { $($m:expr => $d:expr),* }) => {{
        let mut __failures: Vec<String> = Vec::new();

        $({
            use retrace_demangle::Demangle;

            let __mangled = $m;
            let __name = ::retrace_common::Name::new(
                __mangled,
                ::retrace_common::NameMangling::Unknown,
                $l,
            );
            let __demangled = __name.demangle($o);
            let __demangled = __demangled.as_deref().unwrap_or("<demangling failed>");

            if __demangled != $d {
                __failures.push(format!(
                    "{}\n   expected: {}\n   actual:   {}",
                    __mangled,
                    $d,
                    __demangled
                ));
            }
        })*

        if !__failures.is_empty() {
            panic!("demangling failed: \n\n{}\n", __failures.join("\n\n"));
        }
    }};
    ($l:expr, $o:expr, { $($m:expr => $d:expr,)* }) => {
        assert_demangle!($l, $o, { $($m => $d),* })
    };
}
