//! Per-command key extraction
//!
//! Implicit binding needs to know which argument of a command is a key. Most
//! commands take the key first; scripting commands put keys after a numkeys
//! count, stream reads put them after a STREAMS token, and administrative
//! commands carry no key at all.

/// Extract the first key of a command, if it has one
///
/// `args` excludes the command name itself.
pub fn command_key<'a>(cmd: &str, args: &[&'a [u8]]) -> Option<&'a [u8]> {
    let upper = cmd.to_ascii_uppercase();
    match upper.as_str() {
        // Connection, server and cluster management: no key
        "ASKING" | "AUTH" | "BGREWRITEAOF" | "BGSAVE" | "CLIENT" | "CLUSTER" | "COMMAND"
        | "CONFIG" | "DBSIZE" | "DISCARD" | "ECHO" | "EXEC" | "FLUSHALL" | "FLUSHDB"
        | "FUNCTION" | "HELLO" | "INFO" | "KEYS" | "LASTSAVE" | "LATENCY" | "MEMORY"
        | "MULTI" | "PING" | "PSUBSCRIBE" | "PUBLISH" | "PUBSUB" | "PUNSUBSCRIBE" | "QUIT"
        | "RANDOMKEY" | "READONLY" | "READWRITE" | "REPLICAOF" | "RESET" | "SAVE" | "SCAN"
        | "SCRIPT" | "SELECT" | "SHUTDOWN" | "SLAVEOF" | "SLOWLOG" | "SUBSCRIBE" | "SWAPDB"
        | "TIME" | "UNSUBSCRIBE" | "UNWATCH" | "WAIT" => None,

        // Scripting: EVAL script numkeys key [key ...]
        "EVAL" | "EVALSHA" | "EVAL_RO" | "EVALSHA_RO" | "FCALL" | "FCALL_RO" => {
            let numkeys: usize = std::str::from_utf8(args.get(1)?).ok()?.parse().ok()?;
            if numkeys == 0 {
                return None;
            }
            args.get(2).copied()
        }

        // Stream reads: keys follow the STREAMS token
        "XREAD" | "XREADGROUP" => {
            let streams = args
                .iter()
                .position(|a| a.eq_ignore_ascii_case(b"STREAMS"))?;
            args.get(streams + 1).copied()
        }

        // Subcommand first, key second
        "OBJECT" | "XGROUP" | "XINFO" => args.get(1).copied(),

        // Everything else: first argument is the key
        _ => args.first().copied(),
    }
}
