//! Compiled snote patterns (spec §4.4, §6).
//!
//! Patterns are bit-exact with Solanum's server notice wording. `"0"` as an
//! IP literal and `"*"` as an account literal both mean "absent"
//! (spec §6); `temporary|global` must be accepted before the duration in
//! add/remove notices. These regexes accept nicknames/hostnames containing
//! `[`/`]` (spec §9 open question) — do not tighten them.

use regex::Regex;
use std::sync::LazyLock;

pub static CLICONN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\*{3}\ Notice\ --\ Client\ connecting:
        \ (?P<nick>\S+)
        \ \((?P<user>[^@]+)@(?P<host>\S+)\)
        \ \[(?P<ip>\S+)\]\ \S+
        \ <(?P<account>\S+)>
        \ \[(?P<real>.*)\]
        $",
    )
    .expect("valid cliconn regex")
});

pub static CLIEXIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\*{3}\ Notice\ --\ Client\ exiting:
        \ (?P<nick>\S+)
        \ \((?P<user>[^@]+)@(?P<host>\S+)\)
        \ \[(?P<reason>.*)\]
        \ \[(?P<ip>\S+)\]
        $",
    )
    .expect("valid cliexit regex")
});

pub static NICKCHG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\*{3}\ Notice\ --\ Nick\ change:
        \ From\ (?P<old_nick>\S+)
        \ to\ (?P<new_nick>\S+)
        \ \[\S+\]
        $",
    )
    .expect("valid nickchg regex")
});

pub static KLINEADD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\*{3}\ Notice\ --
        \ (?P<source>[^{]+)\{(?P<oper>[^}]+)\}
        \ added\ (?:temporary|global)
        \ (?P<duration>\d+)\ min\.\ K-Line\ for
        \ \[(?P<mask>\S+)\]
        \ \[(?P<reason>.*)\]
        $",
    )
    .expect("valid klineadd regex")
});

pub static KLINEDEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\*{3}\ Notice\ --
        \ (?P<source>[^{]+)\{(?P<oper>[^}]+)\}
        \ has\ removed\ the\ (?:temporary|global)\ K-Line\ for:
        \ \[(?P<mask>\S+)\]
        $",
    )
    .expect("valid klinedel regex")
});

pub static KLINEEXIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\*{3}\ Notice\ --\ Disconnecting\ K-Lined\ user
        \ (?P<nick>\S+)\[[^]]+\]
        \ \((?P<mask>\S+)\)
        $",
    )
    .expect("valid klineexit regex")
});

pub static KLINEREJ: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\*{3}\ Notice\ --\ Rejecting\ K-Lined\ user
        \ (?P<nick>\S+)\[(?P<user>[^]@]+)@(?P<host>[^]]+)\]
        \ \[(?P<ip>\S+)\]
        \ \((?P<mask>\S+)\)
        $",
    )
    .expect("valid klinerej regex")
});

/// Solanum's netsplit snote: `*** Notice -- Netsplit <server1> <-> <server2> (<reason>)`.
pub static NETSPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\*{3}\ Notice\ --\ Netsplit
        \ (?P<server1>\S+)\ <->\ (?P<server2>\S+)
        \ \((?P<reason>.*)\)
        $",
    )
    .expect("valid netsplit regex")
});

/// Solanum's netjoin snote: `*** Notice -- Netjoin <server1> <-> <server2>`.
pub static NETJOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\*{3}\ Notice\ --\ Netjoin
        \ (?P<server1>\S+)\ <->\ (?P<server2>\S+)
        $",
    )
    .expect("valid netjoin regex")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cliconn_matches_solanum_wording() {
        let line = "*** Notice -- Client connecting: alice (a@h.example) [1.2.3.4] {class} <alice> [Alice Example]";
        let caps = CLICONN.captures(line).expect("matches");
        assert_eq!(&caps["nick"], "alice");
        assert_eq!(&caps["user"], "a");
        assert_eq!(&caps["host"], "h.example");
        assert_eq!(&caps["ip"], "1.2.3.4");
        assert_eq!(&caps["account"], "alice");
        assert_eq!(&caps["real"], "Alice Example");
    }

    #[test]
    fn cliconn_absent_ip_and_account_are_literal() {
        let line = "*** Notice -- Client connecting: bob (b@h.example) [0] {class} <*> [Bob]";
        let caps = CLICONN.captures(line).expect("matches");
        assert_eq!(&caps["ip"], "0");
        assert_eq!(&caps["account"], "*");
    }

    #[test]
    fn klineadd_accepts_temporary_and_global() {
        let temp = "*** Notice -- jess!meow@host{jess} added temporary 5 min. K-Line for [*@1.2.3.4] [spam %spam]";
        let global = "*** Notice -- jess!meow@host{jess} added global 5 min. K-Line for [*@1.2.3.4] [spam %spam]";
        assert!(KLINEADD.is_match(temp));
        assert!(KLINEADD.is_match(global));
        let caps = KLINEADD.captures(temp).unwrap();
        assert_eq!(&caps["oper"], "jess");
        assert_eq!(&caps["mask"], "*@1.2.3.4");
        assert_eq!(&caps["duration"], "5");
    }

    #[test]
    fn klinerej_parses_bracketed_user_host() {
        let line = "*** Notice -- Rejecting K-Lined user bob[b@1.2.3.4] [1.2.3.4] (*@1.2.3.4)";
        let caps = KLINEREJ.captures(line).expect("matches");
        assert_eq!(&caps["nick"], "bob");
        assert_eq!(&caps["user"], "b");
        assert_eq!(&caps["host"], "1.2.3.4");
        assert_eq!(&caps["mask"], "*@1.2.3.4");
    }

    #[test]
    fn netsplit_and_netjoin_match() {
        assert!(NETSPLIT.is_match("*** Notice -- Netsplit nodeZ <-> hub.example (connection timed out)"));
        assert!(NETJOIN.is_match("*** Notice -- Netjoin nodeZ <-> hub.example"));
    }
}
