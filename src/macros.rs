macro_rules! str {
    ($s:expr) => {
        $s.to_string()
    };
}

macro_rules! unless {
    ($ex:expr, else $else_block:expr) => {
        match $ex {
            Some(x) => x,
            _ => $else_block,
        }
    };
    ($ex:expr) => {
        match $ex {
            Some(x) => x,
            _ => return,
        }
    };
}

macro_rules! variant {
    ($x:expr, if $($p:ident)::+ ($($id:ident),*) , else $b:block) => {{
        match $x {
            $($p)::+($($id),*) => ($($id),*),
            _ => $b,
        }
    }};
}

/// `class!("List", class!("String"))` builds `List<String>`.
#[macro_export]
macro_rules! class {
    ($name:expr) => {
        $crate::typing::ty::Ty::class($name, vec![])
    };
    ($name:expr, $($arg:expr),+ $(,)?) => {
        $crate::typing::ty::Ty::class($name, vec![$($arg),+])
    };
}

/// A declared type variable, `param!("List", "E")`.
#[macro_export]
macro_rules! param {
    ($owner:expr, $name:expr) => {
        $crate::typing::ty::Ty::Param($crate::typing::ty::TyParam::new($owner, $name))
    };
}

#[macro_export]
macro_rules! ivar {
    ($n:expr) => {
        $crate::typing::ty::Ty::Infer($crate::typing::ty::InferVar($n))
    };
}

#[macro_export]
macro_rules! subst {
    {} => ($crate::typing::subst::Subst::new());

    { $($k:expr => $v:expr),+ $(,)? } => {{
        let mut s = $crate::typing::subst::Subst::new();
        $(s.insert($k, $v);)+
        s
    }};
}
