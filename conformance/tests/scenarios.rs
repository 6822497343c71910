use pretty_assertions::assert_eq;
use xdr_conformance::scenarios::*;
use xdr_runtime::{Procedure, Structural, Xdr, XdrError};

#[test]
fn constants_are_exported() {
    assert_eq!(constant::MAX, 10);
}

#[test]
fn points_round_trip() {
    for (x, y) in [(0, 0), (1, -1), (i32::MAX, i32::MIN)] {
        let point = Point { x, y };
        let bytes = point.to_binary().unwrap();
        let (decoded, rest) = Point::from_binary(&bytes).unwrap();

        assert_eq!(bytes.len(), 8);
        assert_eq!(decoded, point);
        assert!(rest.is_empty());
    }

    let bytes = Point { x: 1, y: 2 }.to_binary().unwrap();
    assert_eq!(bytes, vec![0, 0, 0, 1, 0, 0, 0, 2]);
}

#[test]
fn points_map_to_ordered_objects() {
    let point = Point { x: 3, y: -4 };
    assert_eq!(point.to_json().unwrap(), r#"{"x":3,"y":-4}"#);
    assert_eq!(Point::from_json(r#"{"y":-4,"x":3}"#).unwrap(), point);
}

#[test]
fn colors_decode_by_value() {
    let (color, _) = Color::from_binary(&[0, 0, 0, 1]).unwrap();
    assert_eq!(color, Color::GREEN);

    assert!(matches!(
        Color::from_binary(&[0, 0, 0, 9]),
        Err(XdrError::UnknownDiscriminant {
            name: "Color",
            value: 9
        })
    ));
}

#[test]
fn colors_convert_by_name_or_number() {
    assert_eq!(Color::MEMBERS, &[Color::RED, Color::GREEN, Color::BLUE]);
    assert_eq!(Color::default(), Color::RED);
    assert_eq!(i64::from(Color::BLUE), 2);
    assert_eq!(Color::from_name("GREEN"), Some(Color::GREEN));

    assert_eq!(Color::BLUE.to_json().unwrap(), r#""BLUE""#);
    assert_eq!(Color::from_json("2").unwrap(), Color::BLUE);
    assert!(matches!(
        Color::from_json(r#""PURPLE""#),
        Err(XdrError::UnknownMember { .. })
    ));
}

#[test]
fn matched_arms_round_trip() {
    let msg = Msg {
        kind: 0,
        ival: Some(42),
        ..Default::default()
    };

    let bytes = msg.to_binary().unwrap();
    assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 0, 42]);
    assert_eq!(Msg::from_binary(&bytes).unwrap().0, msg);
}

#[test]
fn defaulted_void_arm_packs_only_the_discriminant() {
    let msg = Msg {
        kind: 5,
        ..Default::default()
    };

    assert_eq!(msg.arm(), None);
    assert_eq!(msg.to_binary().unwrap(), vec![0, 0, 0, 5]);
    assert_eq!(Msg::from_binary(&[0, 0, 0, 5]).unwrap().0, msg);
}

#[test]
fn unselected_arms_are_dropped() {
    let msg = Msg {
        kind: 1,
        ival: Some(7),
        sval: Some("hi".to_owned()),
    };

    let bytes = msg.to_binary().unwrap();
    assert_eq!(bytes, vec![0, 0, 0, 1, 0, 0, 0, 2, b'h', b'i', 0, 0]);

    let (decoded, _) = Msg::from_binary(&bytes).unwrap();
    assert_eq!(decoded.ival, None);
    assert_eq!(decoded.sval.as_deref(), Some("hi"));

    assert_eq!(msg.to_json().unwrap(), r#"{"kind":1,"sval":"hi"}"#);
}

#[test]
fn absent_selected_arms_fail_to_pack() {
    let msg = Msg::default();
    assert!(matches!(
        msg.to_binary(),
        Err(XdrError::MissingArm {
            union: "Msg",
            arm: "ival"
        })
    ));
}

#[test]
fn messages_parse_from_json() {
    let msg = Msg::from_json(r#"{"kind":0,"ival":42,"sval":"ignored"}"#).unwrap();
    assert_eq!(
        msg,
        Msg {
            kind: 0,
            ival: Some(42),
            sval: None
        }
    );
}

#[test]
fn procedures_are_described() {
    use CALC::CALCV1::{self, Service};

    assert_eq!(CALC::ID, 100);
    assert_eq!(CALCV1::ID, 1);
    assert_eq!(CALCV1::add::ID, 1);
    assert_eq!(CALCV1::add::NAME, "CALC.CALCV1.add");

    let procedure = CALCV1::PROCEDURES[0];
    assert_eq!(
        procedure,
        Procedure {
            program: 100,
            version: 1,
            id: 1,
            name: "CALC.CALCV1.add"
        }
    );

    assert_eq!(procedure.service(), "CALC.CALCV1");
    assert_eq!(procedure.method(), "add");

    struct Adder;

    impl Service for Adder {
        fn add(&mut self, arg: CALCV1::add::Arg) -> CALCV1::add::Res {
            arg + 1
        }
    }

    assert_eq!(Adder.add(41), 42);
}

#[test]
fn unmatched_discriminants_round_trip_without_arm() {
    let opt = Opt { k: 5, x: None };

    let bytes = opt.to_binary().unwrap();
    assert_eq!(bytes, vec![0, 0, 0, 5]);
    assert_eq!(Opt::from_binary(&bytes).unwrap().0, opt);

    // Un brazo presente pero no seleccionado no viaja
    let stale = Opt { k: 5, x: Some(9) };
    assert_eq!(stale.to_binary().unwrap(), vec![0, 0, 0, 5]);
    assert_eq!(stale.to_json().unwrap(), r#"{"k":5}"#);
}

#[test]
fn recursive_unions_round_trip() {
    let list = node {
        v: 1,
        next: chain {
            more: true,
            n: Some(Box::new(node {
                v: 2,
                next: chain::default(),
            })),
        },
    };

    let bytes = list.to_binary().unwrap();
    assert_eq!(bytes, vec![0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 0]);

    let (decoded, rest) = node::from_binary(&bytes).unwrap();
    assert_eq!(decoded, list);
    assert!(rest.is_empty());

    assert_eq!(
        list.to_json().unwrap(),
        r#"{"v":1,"next":{"more":true,"n":{"v":2,"next":{"more":false}}}}"#
    );
}
